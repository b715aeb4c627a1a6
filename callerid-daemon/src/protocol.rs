use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use callerid_core::paths::socket_path;

use crate::error::{io_err, DaemonError};
use crate::screening::CallEvent;

/// JSON newline-delimited request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonRequest {
    pub cmd: String,
    /// Caller list or contact sync payload, as sent by the app.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub vacation_mode_active: bool,
    /// `syncContacts`: reply only once the sync has finished.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub wait: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<CallEvent>,
}

impl DaemonRequest {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            ..Self::default()
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// JSON newline-delimited response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Send one JSON request to the daemon socket and return one response.
pub fn send_request(home: &Path, request: &DaemonRequest) -> Result<DaemonResponse, DaemonError> {
    let socket = socket_path(home);
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning { socket });
    }

    let mut stream = UnixStream::connect(&socket).map_err(|err| {
        if matches!(
            err.kind(),
            std::io::ErrorKind::NotFound
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
        ) {
            DaemonError::DaemonNotRunning {
                socket: socket.clone(),
            }
        } else {
            io_err(&socket, err)
        }
    })?;

    let payload = serde_json::to_string(request)?;
    stream
        .write_all(payload.as_bytes())
        .map_err(|e| io_err(&socket, e))?;
    stream.write_all(b"\n").map_err(|e| io_err(&socket, e))?;
    stream.flush().map_err(|e| io_err(&socket, e))?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .map_err(|e| io_err(&socket, e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon closed connection before responding".to_string(),
        ));
    }

    let response: DaemonResponse = serde_json::from_str(line.trim_end())?;
    Ok(response)
}

/// Send `request` and unwrap the response data.
pub fn request(home: &Path, request: &DaemonRequest) -> Result<Value, DaemonError> {
    response_into_data(send_request(home, request)?)
}

pub fn request_status(home: &Path) -> Result<Value, DaemonError> {
    let request = DaemonRequest::new("status");

    let mut last_not_running: Option<DaemonError> = None;
    for attempt in 0..5 {
        match send_request(home, &request) {
            Ok(response) => return response_into_data(response),
            Err(err @ DaemonError::DaemonNotRunning { .. }) => {
                last_not_running = Some(err);
                if attempt < 4 {
                    sleep(Duration::from_millis(100));
                    continue;
                }
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_not_running.unwrap_or_else(|| {
        DaemonError::Protocol("daemon status retry loop exited unexpectedly".to_string())
    }))
}

pub fn request_stop(home: &Path) -> Result<(), DaemonError> {
    request(home, &DaemonRequest::new("stop")).map(|_| ())
}

fn response_into_data(response: DaemonResponse) -> Result<Value, DaemonError> {
    if response.ok {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        Err(DaemonError::Protocol(
            response
                .error
                .unwrap_or_else(|| "unknown daemon error".to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn request_omits_unset_fields() {
        let encoded = serde_json::to_string(&DaemonRequest::new("status")).unwrap();
        assert_eq!(encoded, r#"{"cmd":"status"}"#);
    }

    #[test]
    fn request_decodes_camel_case_fields() {
        let request: DaemonRequest = serde_json::from_str(
            r#"{"cmd":"syncContacts","payload":{"items":[]},"vacationModeActive":true,"wait":true}"#,
        )
        .unwrap();
        assert_eq!(request.cmd, "syncContacts");
        assert!(request.vacation_mode_active);
        assert!(request.wait);
        assert_eq!(request.payload, Some(json!({"items": []})));
    }

    #[test]
    fn missing_socket_means_not_running() {
        let home = TempDir::new().unwrap();
        let err = send_request(home.path(), &DaemonRequest::new("status")).unwrap_err();
        assert!(matches!(err, DaemonError::DaemonNotRunning { .. }));
    }

    #[test]
    fn error_response_becomes_protocol_error() {
        let err = response_into_data(DaemonResponse::error("nope")).unwrap_err();
        assert!(matches!(err, DaemonError::Protocol(m) if m == "nope"));
    }
}
