/*!
 * Device receiver (PLC or similar) and its compensating commands
 */

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use super::{label, lock, Shared};
use crate::command::{Command, CommandCore, CommandId, CommandResult, CommandState};

/// Default connect timeout used by commands that reconnect on undo
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Device operation, used to name failures and to inject them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceOp {
    Connect,
    Disconnect,
    SetParam,
    RemoveParam,
    StartProgram,
    StopProgram,
}

impl fmt::Display for DeviceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceOp::Connect => write!(f, "connect"),
            DeviceOp::Disconnect => write!(f, "disconnect"),
            DeviceOp::SetParam => write!(f, "set_param"),
            DeviceOp::RemoveParam => write!(f, "remove_param"),
            DeviceOp::StartProgram => write!(f, "start_program"),
            DeviceOp::StopProgram => write!(f, "stop_program"),
        }
    }
}

/// Device operation failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("[{0}] Not connected")]
    NotConnected(String),

    #[error("[{device}] Program already running: {program}")]
    ProgramAlreadyRunning { device: String, program: String },

    #[error("[{device}] Simulated {op} failure")]
    Simulated { device: String, op: DeviceOp },
}

/// Operations a device receiver exposes to commands.
///
/// Mutations return what they replaced so commands can restore it.
pub trait Device: Send {
    fn name(&self) -> &str;

    fn is_connected(&self) -> bool;

    fn running_program(&self) -> Option<&str>;

    fn param(&self, key: &str) -> Option<&Value>;

    fn connect(&mut self, timeout: Duration) -> Result<(), DeviceError>;

    /// Close the connection. Disconnecting an unconnected device is a no-op.
    fn disconnect(&mut self) -> Result<(), DeviceError>;

    /// Set a parameter, returning the previous value if there was one
    fn set_param(&mut self, key: &str, value: Value) -> Result<Option<Value>, DeviceError>;

    /// Remove a parameter, returning its value if it was set
    fn remove_param(&mut self, key: &str) -> Result<Option<Value>, DeviceError>;

    fn start_program(&mut self, name: &str) -> Result<(), DeviceError>;

    /// Stop the running program, returning its name if one was running
    fn stop_program(&mut self) -> Result<Option<String>, DeviceError>;
}

fn device_label<D: Device>(device: &Shared<D>) -> String {
    label(device, |d| d.name().to_string())
}

/// In-memory PLC with per-operation fault injection
#[derive(Debug, Clone, Default)]
pub struct PlcDevice {
    name: String,
    connected: bool,
    params: BTreeMap<String, Value>,
    running_program: Option<String>,
    failing: HashSet<DeviceOp>,
}

impl PlcDevice {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Make `op` fail until cleared
    pub fn fail_on(mut self, op: DeviceOp) -> Self {
        self.failing.insert(op);
        self
    }

    pub fn set_failing(&mut self, op: DeviceOp, failing: bool) {
        if failing {
            self.failing.insert(op);
        } else {
            self.failing.remove(&op);
        }
    }

    pub fn params(&self) -> &BTreeMap<String, Value> {
        &self.params
    }

    fn check(&self, op: DeviceOp) -> Result<(), DeviceError> {
        if self.failing.contains(&op) {
            return Err(DeviceError::Simulated {
                device: self.name.clone(),
                op,
            });
        }
        Ok(())
    }

    fn require_connected(&self) -> Result<(), DeviceError> {
        if !self.connected {
            return Err(DeviceError::NotConnected(self.name.clone()));
        }
        Ok(())
    }
}

impl Device for PlcDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn running_program(&self) -> Option<&str> {
        self.running_program.as_deref()
    }

    fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    fn connect(&mut self, _timeout: Duration) -> Result<(), DeviceError> {
        self.check(DeviceOp::Connect)?;
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), DeviceError> {
        if !self.connected {
            return Ok(());
        }
        self.check(DeviceOp::Disconnect)?;
        self.connected = false;
        Ok(())
    }

    fn set_param(&mut self, key: &str, value: Value) -> Result<Option<Value>, DeviceError> {
        self.require_connected()?;
        self.check(DeviceOp::SetParam)?;
        Ok(self.params.insert(key.to_string(), value))
    }

    fn remove_param(&mut self, key: &str) -> Result<Option<Value>, DeviceError> {
        self.require_connected()?;
        self.check(DeviceOp::RemoveParam)?;
        Ok(self.params.remove(key))
    }

    fn start_program(&mut self, name: &str) -> Result<(), DeviceError> {
        self.require_connected()?;
        self.check(DeviceOp::StartProgram)?;
        if let Some(running) = &self.running_program {
            return Err(DeviceError::ProgramAlreadyRunning {
                device: self.name.clone(),
                program: running.clone(),
            });
        }
        self.running_program = Some(name.to_string());
        Ok(())
    }

    fn stop_program(&mut self) -> Result<Option<String>, DeviceError> {
        self.require_connected()?;
        self.check(DeviceOp::StopProgram)?;
        Ok(self.running_program.take())
    }
}

/// Connects to a device; undo disconnects only if this command opened the connection
pub struct ConnectCommand<D: Device> {
    core: CommandCore,
    device: Shared<D>,
    timeout: Duration,
    was_connected: bool,
}

impl<D: Device> ConnectCommand<D> {
    pub fn new(device: Shared<D>, timeout: Duration) -> Self {
        let core = CommandCore::new(format!("Connect({})", device_label(&device)));
        Self {
            core,
            device,
            timeout,
            was_connected: false,
        }
    }
}

impl<D: Device> Command for ConnectCommand<D> {
    fn id(&self) -> CommandId {
        self.core.id()
    }

    fn description(&self) -> &str {
        self.core.description()
    }

    fn state(&self) -> CommandState {
        self.core.state()
    }

    fn execute(&mut self) -> CommandResult {
        self.core.execute_with(|| {
            let mut device = lock(&self.device);
            self.was_connected = device.is_connected();
            if !self.was_connected {
                device.connect(self.timeout)?;
            }
            Ok(format!("Connected to {}", device.name()))
        })
    }

    fn undo(&mut self) -> CommandResult {
        self.core.undo_with(|| {
            let mut device = lock(&self.device);
            if !self.was_connected {
                device.disconnect()?;
            }
            Ok(format!("Disconnected from {}", device.name()))
        })
    }
}

/// Disconnects from a device; undo reconnects if it was connected before
pub struct DisconnectCommand<D: Device> {
    core: CommandCore,
    device: Shared<D>,
    reconnect_timeout: Duration,
    was_connected: bool,
}

impl<D: Device> DisconnectCommand<D> {
    pub fn new(device: Shared<D>) -> Self {
        let core = CommandCore::new(format!("Disconnect({})", device_label(&device)));
        Self {
            core,
            device,
            reconnect_timeout: DEFAULT_CONNECT_TIMEOUT,
            was_connected: false,
        }
    }

    pub fn with_reconnect_timeout(mut self, timeout: Duration) -> Self {
        self.reconnect_timeout = timeout;
        self
    }
}

impl<D: Device> Command for DisconnectCommand<D> {
    fn id(&self) -> CommandId {
        self.core.id()
    }

    fn description(&self) -> &str {
        self.core.description()
    }

    fn state(&self) -> CommandState {
        self.core.state()
    }

    fn execute(&mut self) -> CommandResult {
        self.core.execute_with(|| {
            let mut device = lock(&self.device);
            self.was_connected = device.is_connected();
            device.disconnect()?;
            Ok(format!("Disconnected from {}", device.name()))
        })
    }

    fn undo(&mut self) -> CommandResult {
        self.core.undo_with(|| {
            let mut device = lock(&self.device);
            if self.was_connected {
                device.connect(self.reconnect_timeout)?;
            }
            Ok(format!("Reconnected to {}", device.name()))
        })
    }
}

/// Sets a device parameter; undo restores the previous value or removes the key
pub struct SetParameterCommand<D: Device> {
    core: CommandCore,
    device: Shared<D>,
    key: String,
    value: Value,
    previous: Option<Value>,
}

impl<D: Device> SetParameterCommand<D> {
    pub fn new(device: Shared<D>, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        let value = value.into();
        let core = CommandCore::new(format!(
            "SetParam({}.{}={})",
            device_label(&device),
            key,
            value
        ));
        Self {
            core,
            device,
            key,
            value,
            previous: None,
        }
    }
}

impl<D: Device> Command for SetParameterCommand<D> {
    fn id(&self) -> CommandId {
        self.core.id()
    }

    fn description(&self) -> &str {
        self.core.description()
    }

    fn state(&self) -> CommandState {
        self.core.state()
    }

    fn execute(&mut self) -> CommandResult {
        self.core.execute_with(|| {
            let mut device = lock(&self.device);
            self.previous = device.set_param(&self.key, self.value.clone())?;
            Ok(format!("Set {} = {}", self.key, self.value))
        })
    }

    fn undo(&mut self) -> CommandResult {
        self.core.undo_with(|| {
            let mut device = lock(&self.device);
            match &self.previous {
                Some(previous) => {
                    device.set_param(&self.key, previous.clone())?;
                    Ok(format!("Restored {} = {}", self.key, previous))
                }
                None => {
                    device.remove_param(&self.key)?;
                    Ok(format!("Removed {}", self.key))
                }
            }
        })
    }
}

/// Starts a program; undo stops it only if it is still the running program
pub struct StartProgramCommand<D: Device> {
    core: CommandCore,
    device: Shared<D>,
    program: String,
}

impl<D: Device> StartProgramCommand<D> {
    pub fn new(device: Shared<D>, program: impl Into<String>) -> Self {
        let program = program.into();
        let core = CommandCore::new(format!(
            "StartProgram({}:{})",
            device_label(&device),
            program
        ));
        Self {
            core,
            device,
            program,
        }
    }
}

impl<D: Device> Command for StartProgramCommand<D> {
    fn id(&self) -> CommandId {
        self.core.id()
    }

    fn description(&self) -> &str {
        self.core.description()
    }

    fn state(&self) -> CommandState {
        self.core.state()
    }

    fn execute(&mut self) -> CommandResult {
        self.core.execute_with(|| {
            lock(&self.device).start_program(&self.program)?;
            Ok(format!("Started {}", self.program))
        })
    }

    fn undo(&mut self) -> CommandResult {
        self.core.undo_with(|| {
            let mut device = lock(&self.device);
            if device.running_program() == Some(self.program.as_str()) {
                device.stop_program()?;
                Ok(format!("Stopped {}", self.program))
            } else {
                Ok(format!("{} no longer running", self.program))
            }
        })
    }
}

/// Stops the running program; undo restarts whatever was stopped
pub struct StopProgramCommand<D: Device> {
    core: CommandCore,
    device: Shared<D>,
    stopped: Option<String>,
}

impl<D: Device> StopProgramCommand<D> {
    pub fn new(device: Shared<D>) -> Self {
        let core = CommandCore::new(format!("StopProgram({})", device_label(&device)));
        Self {
            core,
            device,
            stopped: None,
        }
    }
}

impl<D: Device> Command for StopProgramCommand<D> {
    fn id(&self) -> CommandId {
        self.core.id()
    }

    fn description(&self) -> &str {
        self.core.description()
    }

    fn state(&self) -> CommandState {
        self.core.state()
    }

    fn execute(&mut self) -> CommandResult {
        self.core.execute_with(|| {
            self.stopped = lock(&self.device).stop_program()?;
            match &self.stopped {
                Some(program) => Ok(format!("Stopped {}", program)),
                None => Ok("No program was running".to_string()),
            }
        })
    }

    fn undo(&mut self) -> CommandResult {
        self.core.undo_with(|| match &self.stopped {
            Some(program) => {
                lock(&self.device).start_program(program)?;
                Ok(format!("Restarted {}", program))
            }
            None => Ok("Nothing to restart".to_string()),
        })
    }
}
