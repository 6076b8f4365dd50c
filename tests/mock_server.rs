//! Integration tests against an in-process mock data server.
//!
//! The mock speaks the full wire protocol over a real TCP socket, so
//! these tests exercise the client end to end: framing, the payload
//! codec, subscriptions, modules and the AWG helpers.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use zidaq::data::{encode_records, Chunk, SweepRecord};
use zidaq::protocol::{Protocol, Tag, HEADER_SIZE};
use zidaq::types::{DemodBurst, DemodSample, ZiValue};
use zidaq::{DaqClient, ModuleKind, NodePath, ScopeModule, ZiError};

const SERVER_VERSION: &str = "24.10.1";
const MISSING_NODE: i32 = -32601;

/// World state of one mock server instance.
#[derive(Default)]
struct MockState {
    nodes: BTreeMap<String, ZiValue>,
    subscriptions: Vec<String>,
    next_handle: u32,
    module_params: BTreeMap<(u32, String), ZiValue>,
    /// Every `Module.GetI` fails with a server error.
    fail_module_get: bool,
    /// Assert the timeout field of every `Stream.Poll` request.
    expect_poll_timeout_ms: Option<u32>,
    /// `Module.Finished` reports false this many times before true.
    finish_after: u32,
    finish_countdown: u32,
    /// Body of `Module.Read`, delivered once then replaced by an empty
    /// record set.
    module_data: Vec<(NodePath, Chunk)>,
    module_data_sent: bool,
    /// Responses for successive `Awg.CompilerStatus` calls; the last
    /// entry repeats.
    compiler_statuses: Vec<(i32, String)>,
    compiler_calls: usize,
    awg_source: Option<String>,
}

struct MockServer {
    addr: SocketAddr,
    _handle: thread::JoinHandle<()>,
}

impl MockServer {
    fn start(state: MockState) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || serve(listener, state));
        Self {
            addr,
            _handle: handle,
        }
    }

    fn connect(&self) -> DaqClient {
        DaqClient::connect(&self.addr.ip().to_string(), self.addr.port()).unwrap()
    }
}

fn serve(listener: TcpListener, mut state: MockState) {
    let mut stream = match listener.accept() {
        Ok((stream, _)) => stream,
        Err(_) => return,
    };
    loop {
        let mut header = [0u8; HEADER_SIZE];
        if stream.read_exact(&mut header).is_err() {
            return;
        }
        let command = String::from_utf8_lossy(&header[..32])
            .trim_end_matches('\0')
            .to_string();
        let body_size = u32::from_be_bytes([header[32], header[33], header[34], header[35]]);
        let mut body = vec![0u8; body_size as usize];
        if stream.read_exact(&mut body).is_err() {
            return;
        }
        let response = state.dispatch(&command, &body);
        if write_frame(&mut stream, &command, &response).is_err() {
            return;
        }
    }
}

fn write_frame(stream: &mut TcpStream, command: &str, body: &[u8]) -> std::io::Result<()> {
    let header = Protocol::command_header(command, body.len() as u32);
    stream.write_all(&header)?;
    stream.write_all(body)
}

fn fields(values: &[(ZiValue, Tag)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (value, tag) in values {
        Protocol::serialize_value(value, *tag, &mut out).unwrap();
    }
    out
}

/// A valid field of the requested type followed by an error trailer.
fn error_reply(placeholder: ZiValue, tag: Tag, code: i32, message: &str) -> Vec<u8> {
    let mut out = fields(&[(placeholder, tag)]);
    out.extend_from_slice(&code.to_be_bytes());
    out.extend_from_slice(&(message.len() as i32).to_be_bytes());
    out.extend_from_slice(message.as_bytes());
    out
}

fn demod_burst(samples: usize) -> Chunk {
    let samples = (0..samples)
        .map(|i| DemodSample {
            timestamp: 1000 + i as u64 * 18,
            x: 1e-3,
            y: 2e-3,
            frequency: 400e3,
            phase: 0.0,
            dio: 0,
            trigger: 0,
            aux_in0: 0.0,
            aux_in1: 0.0,
        })
        .collect();
    Chunk::Demod(DemodBurst {
        samples,
        data_loss: false,
    })
}

impl MockState {
    fn dispatch(&mut self, command: &str, body: &[u8]) -> Vec<u8> {
        let mut cursor = Cursor::new(body);
        let mut arg = |tag: Tag| Protocol::parse_value(&mut cursor, tag).unwrap();
        match command {
            "Session.Hello" => {
                let _level = arg(Tag::U32);
                let _client_version = arg(Tag::Str);
                fields(&[(ZiValue::String(SERVER_VERSION.to_string()), Tag::Str)])
            }
            "Session.Sync" => Vec::new(),
            "Device.Connect" => {
                let _serial = arg(Tag::Str);
                let _interface = arg(Tag::Str);
                Vec::new()
            }
            "Device.Props" => {
                let _serial = arg(Tag::Str);
                fields(&[
                    (ZiValue::String("UHFLI".to_string()), Tag::Str),
                    (
                        ZiValue::VecString(vec!["AWG".to_string(), "PID".to_string()]),
                        Tag::VecStr,
                    ),
                    (
                        ZiValue::VecString(vec!["1GbE".to_string(), "USB".to_string()]),
                        Tag::VecStr,
                    ),
                    (ZiValue::F64(1.8e9), Tag::F64),
                ])
            }
            "Node.SetI" => {
                let path = arg(Tag::Str);
                let value = arg(Tag::I64);
                self.nodes.insert(path.as_str().unwrap().to_string(), value);
                Vec::new()
            }
            "Node.SetD" => {
                let path = arg(Tag::Str);
                let value = arg(Tag::F64);
                self.nodes.insert(path.as_str().unwrap().to_string(), value);
                Vec::new()
            }
            "Node.SetS" => {
                let path = arg(Tag::Str);
                let value = arg(Tag::Str);
                self.nodes.insert(path.as_str().unwrap().to_string(), value);
                Vec::new()
            }
            "Node.SetV" => {
                let path = arg(Tag::Str);
                let value = arg(Tag::VecF64);
                self.nodes.insert(path.as_str().unwrap().to_string(), value);
                Vec::new()
            }
            "Node.GetI" => self.typed_get(arg(Tag::Str), ZiValue::I64(0), Tag::I64),
            "Node.GetD" => self.typed_get(arg(Tag::Str), ZiValue::F64(0.0), Tag::F64),
            "Node.GetS" => self.typed_get(
                arg(Tag::Str),
                ZiValue::String(String::new()),
                Tag::Str,
            ),
            "Node.GetV" => self.typed_get(arg(Tag::Str), ZiValue::VecF64(Vec::new()), Tag::VecF64),
            "Node.Get" => {
                let pattern = NodePath::parse(arg(Tag::Str).as_str().unwrap()).unwrap();
                let matches: Vec<(String, ZiValue)> = self
                    .nodes
                    .iter()
                    .filter(|(path, _)| pattern.matches(&NodePath::parse(path).unwrap()))
                    .map(|(path, value)| (path.clone(), value.clone()))
                    .collect();
                let mut out = Vec::new();
                out.extend_from_slice(&(matches.len() as u32).to_be_bytes());
                for (path, value) in matches {
                    out.extend_from_slice(&(path.len() as u32).to_be_bytes());
                    out.extend_from_slice(path.as_bytes());
                    let (code, tag) = match &value {
                        ZiValue::I64(_) => (0u8, Tag::I64),
                        ZiValue::F64(_) => (1u8, Tag::F64),
                        ZiValue::String(_) => (2u8, Tag::Str),
                        _ => (3u8, Tag::VecF64),
                    };
                    out.push(code);
                    Protocol::serialize_value(&value, tag, &mut out).unwrap();
                }
                out
            }
            "Node.List" => {
                let prefix = arg(Tag::Str).as_str().unwrap().to_string();
                let _flags = arg(Tag::U32);
                let listing: Vec<String> = self
                    .nodes
                    .keys()
                    .filter(|path| path.starts_with(&prefix))
                    .cloned()
                    .collect();
                fields(&[(ZiValue::VecString(listing), Tag::VecStr)])
            }
            "Node.GetSample" => {
                let path = NodePath::parse(arg(Tag::Str).as_str().unwrap()).unwrap();
                encode_records(&[(path, demod_burst(1))])
            }
            "Stream.Subscribe" => {
                self.subscriptions
                    .push(arg(Tag::Str).as_str().unwrap().to_string());
                Vec::new()
            }
            "Stream.Unsubscribe" => {
                let path = arg(Tag::Str).as_str().unwrap().to_string();
                if path == "*" {
                    self.subscriptions.clear();
                } else {
                    self.subscriptions.retain(|p| p != &path);
                }
                Vec::new()
            }
            "Stream.Poll" => {
                let _duration = arg(Tag::F64);
                let timeout_ms = arg(Tag::U32).as_u32().unwrap();
                if let Some(expected) = self.expect_poll_timeout_ms {
                    assert_eq!(timeout_ms, expected);
                }
                let _flags = arg(Tag::U32);
                let records: Vec<(NodePath, Chunk)> = self
                    .subscriptions
                    .iter()
                    .map(|path| (NodePath::parse(path).unwrap(), demod_burst(5)))
                    .collect();
                encode_records(&records)
            }
            "Module.Open" => {
                let _kind = arg(Tag::Str);
                self.next_handle += 1;
                self.finish_countdown = self.finish_after;
                fields(&[(ZiValue::U32(self.next_handle), Tag::U32)])
            }
            "Module.SetI" => {
                let handle = arg(Tag::U32).as_u32().unwrap();
                let param = arg(Tag::Str).as_str().unwrap().to_string();
                let value = arg(Tag::I64);
                self.module_params.insert((handle, param), value);
                Vec::new()
            }
            "Module.SetD" => {
                let handle = arg(Tag::U32).as_u32().unwrap();
                let param = arg(Tag::Str).as_str().unwrap().to_string();
                let value = arg(Tag::F64);
                self.module_params.insert((handle, param), value);
                Vec::new()
            }
            "Module.SetS" => {
                let handle = arg(Tag::U32).as_u32().unwrap();
                let param = arg(Tag::Str).as_str().unwrap().to_string();
                let value = arg(Tag::Str);
                self.module_params.insert((handle, param), value);
                Vec::new()
            }
            "Module.GetI" => {
                if self.fail_module_get {
                    return error_reply(ZiValue::I64(0), Tag::I64, -1, "internal error");
                }
                let handle = arg(Tag::U32).as_u32().unwrap();
                let param = arg(Tag::Str).as_str().unwrap().to_string();
                let value = self
                    .module_params
                    .get(&(handle, param))
                    .cloned()
                    .unwrap_or(ZiValue::I64(0));
                fields(&[(value, Tag::I64)])
            }
            "Module.GetD" => {
                let handle = arg(Tag::U32).as_u32().unwrap();
                let param = arg(Tag::Str).as_str().unwrap().to_string();
                let value = self
                    .module_params
                    .get(&(handle, param))
                    .cloned()
                    .unwrap_or(ZiValue::F64(0.0));
                fields(&[(value, Tag::F64)])
            }
            "Module.GetS" => {
                let handle = arg(Tag::U32).as_u32().unwrap();
                let param = arg(Tag::Str).as_str().unwrap().to_string();
                let value = self
                    .module_params
                    .get(&(handle, param))
                    .cloned()
                    .unwrap_or_else(|| ZiValue::String(String::new()));
                fields(&[(value, Tag::Str)])
            }
            "Module.Subscribe" | "Module.Unsubscribe" | "Module.Execute" | "Module.Close" => {
                Vec::new()
            }
            "Module.Progress" => {
                let done = self.finish_countdown == 0;
                fields(&[(ZiValue::F64(if done { 1.0 } else { 0.25 }), Tag::F64)])
            }
            "Module.Finished" => {
                let _handle = arg(Tag::U32);
                let done = self.finish_countdown == 0;
                if !done {
                    self.finish_countdown -= 1;
                }
                fields(&[(ZiValue::U32(u32::from(done)), Tag::U32)])
            }
            "Module.Finish" => {
                self.finish_countdown = 0;
                Vec::new()
            }
            "Module.Read" => {
                if self.module_data_sent {
                    encode_records(&[])
                } else {
                    self.module_data_sent = true;
                    encode_records(&self.module_data)
                }
            }
            "Awg.UploadSource" => {
                let _serial = arg(Tag::Str);
                let _index = arg(Tag::U32);
                self.awg_source = Some(arg(Tag::Str).as_str().unwrap().to_string());
                Vec::new()
            }
            "Awg.CompilerStatus" => {
                let _serial = arg(Tag::Str);
                let _index = arg(Tag::U32);
                let index = self.compiler_calls.min(self.compiler_statuses.len() - 1);
                self.compiler_calls += 1;
                let (code, message) = self.compiler_statuses[index].clone();
                fields(&[
                    (ZiValue::I32(code), Tag::I32),
                    (ZiValue::String(message), Tag::Str),
                    (ZiValue::F64(1.0), Tag::F64),
                ])
            }
            other => panic!("mock server got unexpected command {other:?}"),
        }
    }

    fn typed_get(&self, path: ZiValue, placeholder: ZiValue, tag: Tag) -> Vec<u8> {
        let path = path.as_str().unwrap();
        match self.nodes.get(path) {
            Some(value) => fields(&[(value.clone(), tag)]),
            None => error_reply(placeholder, tag, MISSING_NODE, "node not found"),
        }
    }
}

#[test]
fn hello_exchanges_versions() {
    let server = MockServer::start(MockState::default());
    let client = server.connect();
    assert_eq!(client.server_version(), SERVER_VERSION);
    client.check_server_version().unwrap();
}

#[test]
fn node_settings_round_trip() {
    let server = MockServer::start(MockState::default());
    let mut client = server.connect();

    let freq = NodePath::parse("/dev2006/oscs/0/freq").unwrap();
    let order = NodePath::parse("/dev2006/demods/0/order").unwrap();
    let wave = NodePath::parse("/dev2006/awgs/0/waveform/waves/0").unwrap();

    client.set_double(&freq, 400e3).unwrap();
    client.set_int(&order, 4).unwrap();
    client.set_vector_double(&wave, &[0.0, 0.5, 1.0]).unwrap();
    client.sync().unwrap();

    assert_eq!(client.get_double(&freq).unwrap(), 400e3);
    assert_eq!(client.get_int(&order).unwrap(), 4);
    assert_eq!(client.get_vector_double(&wave).unwrap(), vec![0.0, 0.5, 1.0]);
}

#[test]
fn missing_node_is_a_server_error() {
    let server = MockServer::start(MockState::default());
    let mut client = server.connect();

    let path = NodePath::parse("/dev2006/oscs/9/freq").unwrap();
    let err = client.get_double(&path).unwrap_err();
    match err {
        ZiError::ServerError { code, message } => {
            assert_eq!(code, MISSING_NODE);
            assert_eq!(message, "node not found");
        }
        other => panic!("expected ServerError, got {other:?}"),
    }
}

#[test]
fn wildcard_get_returns_all_matches() {
    let server = MockServer::start(MockState::default());
    let mut client = server.connect();

    for i in 0..3 {
        let path = NodePath::parse(&format!("/dev2006/demods/{i}/rate")).unwrap();
        client.set_double(&path, 10e3 * (i + 1) as f64).unwrap();
    }
    client
        .set_double(&NodePath::parse("/dev2006/oscs/0/freq").unwrap(), 400e3)
        .unwrap();

    let pattern = NodePath::parse("/dev2006/demods/*/rate").unwrap();
    let entries = client.get(&pattern).unwrap();
    assert_eq!(entries.len(), 3);
    for (path, value) in &entries {
        assert!(pattern.matches(path));
        assert!(value.as_f64().unwrap() >= 10e3);
    }
}

#[test]
fn list_nodes_returns_branch() {
    let server = MockServer::start(MockState::default());
    let mut client = server.connect();

    client
        .set_double(&NodePath::parse("/dev2006/oscs/0/freq").unwrap(), 1.0)
        .unwrap();
    client
        .set_double(&NodePath::parse("/dev2006/oscs/1/freq").unwrap(), 2.0)
        .unwrap();

    let nodes = client
        .list_nodes(&NodePath::parse("/dev2006/oscs").unwrap(), true)
        .unwrap();
    assert_eq!(nodes.len(), 2);
}

#[test]
fn device_connect_reports_props() {
    let server = MockServer::start(MockState::default());
    let mut client = server.connect();

    let props = client.connect_device("DEV2006", "1GbE").unwrap();
    assert_eq!(props.serial, "dev2006");
    assert_eq!(props.devtype, "UHFLI");
    assert_eq!(props.clockbase, 1.8e9);
    assert!(props.has_option("awg"));
    DaqClient::require_devtype(&props, &["UHF"]).unwrap();
    DaqClient::require_option(&props, "PID").unwrap();
    assert!(matches!(
        DaqClient::require_devtype(&props, &["MF"]),
        Err(ZiError::UnsupportedDevice(_))
    ));
}

#[test]
fn subscribe_poll_returns_demod_data() {
    let server = MockServer::start(MockState::default());
    let mut client = server.connect();

    let sample = NodePath::parse("/dev2006/demods/0/sample").unwrap();
    client.subscribe(&sample).unwrap();
    let result = client
        .poll(
            Duration::from_millis(10),
            Duration::from_millis(100),
            zidaq::poll_flags::NONE,
        )
        .unwrap();

    let burst = result.demod_samples(&sample).unwrap();
    assert_eq!(burst.samples.len(), 5);
    assert!(!burst.data_loss);
    assert!(result.lossless());
    let r = burst.samples[0].r();
    assert!((r - (1e-3f64).hypot(2e-3)).abs() < 1e-12);

    client.unsubscribe(&sample).unwrap();
    let empty = client
        .poll(
            Duration::from_millis(10),
            Duration::from_millis(100),
            zidaq::poll_flags::NONE,
        )
        .unwrap();
    assert!(empty.is_empty());
}

#[test]
fn oversized_poll_timeout_saturates() {
    let state = MockState {
        expect_poll_timeout_ms: Some(u32::MAX),
        ..Default::default()
    };
    let server = MockServer::start(state);
    let mut client = server.connect();

    // Longer than u32::MAX milliseconds; the wire field must saturate
    // instead of wrapping.
    let result = client
        .poll(
            Duration::from_millis(1),
            Duration::from_secs(5_000_000),
            zidaq::poll_flags::NONE,
        )
        .unwrap();
    assert!(result.is_empty());
}

#[test]
fn get_sample_returns_one_reading() {
    let server = MockServer::start(MockState::default());
    let mut client = server.connect();

    let path = NodePath::parse("/dev2006/demods/0/sample").unwrap();
    let sample = client.get_sample(&path).unwrap();
    assert_eq!(sample.frequency, 400e3);
}

#[test]
fn module_lifecycle_runs_to_completion() {
    let sample = NodePath::parse("/dev2006/demods/0/sample").unwrap();
    let state = MockState {
        finish_after: 2,
        module_data: vec![(
            sample.clone(),
            Chunk::Sweep(SweepRecord {
                grid: vec![1e3, 2e3, 3e3],
                x: vec![1e-3, 2e-3, 3e-3],
                y: vec![0.0, 0.0, 0.0],
                bandwidth: vec![10.0, 10.0, 10.0],
                count: vec![8, 8, 8],
            }),
        )],
        ..Default::default()
    };
    let server = MockServer::start(state);
    let mut client = server.connect();

    let mut module = client.module(ModuleKind::Sweeper).unwrap();
    module.set_string("device", "dev2006").unwrap();
    module.set_double("start", 1e3).unwrap();
    module.set_int("samplecount", 3).unwrap();
    assert_eq!(module.get_string("device").unwrap(), "dev2006");
    assert_eq!(module.get_double("start").unwrap(), 1e3);

    module.subscribe(&sample).unwrap();
    module.execute().unwrap();
    module
        .wait_finished(Duration::from_secs(5), Duration::from_millis(10))
        .unwrap();
    assert!(module.finished().unwrap());
    assert_eq!(module.progress().unwrap(), 1.0);

    let result = module.read().unwrap();
    let records = result.sweep_records(&sample).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].grid, vec![1e3, 2e3, 3e3]);
    assert_eq!(records[0].r()[0], 1e-3);
}

#[test]
fn stuck_module_times_out_and_is_finished() {
    let state = MockState {
        finish_after: u32::MAX,
        ..Default::default()
    };
    let server = MockServer::start(state);
    let mut client = server.connect();

    let mut module = client.module(ModuleKind::DataAcquisition).unwrap();
    module.execute().unwrap();
    let err = module
        .wait_finished(Duration::from_millis(100), Duration::from_millis(10))
        .unwrap_err();
    assert!(matches!(err, ZiError::Timeout));
    // The timeout path sends Module.Finish, so the module now reports
    // done.
    assert!(module.finished().unwrap());
}

#[test]
fn failed_scope_collection_disables_device_scope() {
    let state = MockState {
        fail_module_get: true,
        ..Default::default()
    };
    let server = MockServer::start(state);
    let mut client = server.connect();

    {
        let mut scope = ScopeModule::new(&mut client).unwrap();
        let err = scope
            .get_records("dev2006", 1, Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, ZiError::ServerError { .. }));
    }

    // The error path must still switch the device scope off.
    let enable = NodePath::parse("/dev2006/scopes/0/enable").unwrap();
    assert_eq!(client.get_int(&enable).unwrap(), 0);
}

#[test]
fn awg_upload_and_compile() {
    let state = MockState {
        compiler_statuses: vec![
            (-1, String::new()),
            (-1, String::new()),
            (0, "compilation successful".to_string()),
        ],
        ..Default::default()
    };
    let server = MockServer::start(state);
    let mut client = server.connect();

    client
        .awg_upload_source("dev2006", 0, "wave w = ones(16); playWave(w);")
        .unwrap();
    client
        .awg_wait_compiled("dev2006", 0, Duration::from_secs(5))
        .unwrap();
}

#[test]
fn awg_compile_failure_is_reported() {
    let state = MockState {
        compiler_statuses: vec![(1, "syntax error on line 1".to_string())],
        ..Default::default()
    };
    let server = MockServer::start(state);
    let mut client = server.connect();

    client.awg_upload_source("dev2006", 0, "not a program").unwrap();
    let err = client
        .awg_wait_compiled("dev2006", 0, Duration::from_secs(5))
        .unwrap_err();
    match err {
        ZiError::Compiler(message) => assert!(message.contains("syntax error")),
        other => panic!("expected Compiler error, got {other:?}"),
    }
}

#[test]
fn empty_upload_is_rejected_client_side() {
    let server = MockServer::start(MockState::default());
    let mut client = server.connect();
    assert!(matches!(
        client.awg_upload_source("dev2006", 0, "  "),
        Err(ZiError::InvalidArgument(_))
    ));
}
