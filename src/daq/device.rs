use log::info;

use super::DaqClient;
use crate::error::ZiError;
use crate::node::NodePath;
use crate::protocol::Tag;
use crate::types::{DeviceProps, ZiValue};

impl DaqClient {
    /// Bind a device to this session and discover its properties.
    ///
    /// `interface` selects how the data server reaches the instrument,
    /// e.g. "1GbE" or "USB"; an empty string lets the server pick.
    pub fn connect_device(
        &mut self,
        serial: &str,
        interface: &str,
    ) -> Result<DeviceProps, ZiError> {
        let serial = serial.trim().to_ascii_lowercase();
        if !serial.starts_with("dev") {
            return Err(ZiError::InvalidArgument(format!(
                "Device serial must look like 'dev1234', got {serial:?}"
            )));
        }
        self.transact(
            "Device.Connect",
            vec![
                ZiValue::String(serial.clone()),
                ZiValue::String(interface.to_string()),
            ],
            &[Tag::Str, Tag::Str],
            &[],
        )?;
        let props = self.device_props(&serial)?;
        info!(
            "Connected to {} ({}, options: {})",
            props.serial,
            props.devtype,
            props.options.join(",")
        );
        Ok(props)
    }

    /// Discovery properties of an already connected device.
    pub fn device_props(&mut self, serial: &str) -> Result<DeviceProps, ZiError> {
        let result = self.transact(
            "Device.Props",
            vec![ZiValue::String(serial.to_string())],
            &[Tag::Str],
            &[Tag::Str, Tag::VecStr, Tag::VecStr, Tag::F64],
        )?;
        if result.len() < 4 {
            return Err(ZiError::Protocol(
                "Incomplete device properties response".to_string(),
            ));
        }
        Ok(DeviceProps {
            serial: serial.to_ascii_lowercase(),
            devtype: result[0].as_str()?.to_string(),
            options: result[1].as_string_vec()?.to_vec(),
            interfaces: result[2].as_string_vec()?.to_vec(),
            clockbase: result[3].as_f64()?,
        })
    }

    /// Fail unless the device type starts with one of the given prefixes.
    ///
    /// The gate every example applies before configuring hardware it
    /// cannot run on.
    pub fn require_devtype(props: &DeviceProps, prefixes: &[&str]) -> Result<(), ZiError> {
        if prefixes
            .iter()
            .any(|p| props.devtype.to_ascii_uppercase().starts_with(&p.to_ascii_uppercase()))
        {
            Ok(())
        } else {
            Err(ZiError::UnsupportedDevice(format!(
                "{} is a {}; this requires one of {:?}",
                props.serial, props.devtype, prefixes
            )))
        }
    }

    /// Fail unless the named option is installed on the device.
    pub fn require_option(props: &DeviceProps, option: &str) -> Result<(), ZiError> {
        if props.has_option(option) {
            Ok(())
        } else {
            Err(ZiError::UnsupportedDevice(format!(
                "{} does not have the {option} option installed",
                props.serial
            )))
        }
    }

    /// Put a device into a known base state: disable all signal outputs,
    /// demodulators, scopes and AWGs before configuring an experiment.
    pub fn disable_everything(&mut self, serial: &str) -> Result<(), ZiError> {
        let int_branches = [
            "sigouts/*/on",
            "demods/*/enable",
            "demods/*/trigger",
            "scopes/*/enable",
            "awgs/*/enable",
            "sigouts/*/enables/*",
        ];
        let device = NodePath::parse(serial)?;
        let mut settings = Vec::with_capacity(int_branches.len() + 1);
        for branch in int_branches {
            settings.push((device.join(branch)?, ZiValue::I64(0)));
        }
        settings.push((device.join("aouts/*/offset")?, ZiValue::F64(0.0)));
        self.set(&settings)?;
        self.sync()
    }
}
