//! The serial line worker.
//!
//! Owns the serial port and performs all blocking I/O on a dedicated
//! thread. Callers submit work through a queue and receive exactly one
//! completion per request through a one-shot channel. Because the bus is
//! half-duplex with local echo, every receive buffer starts with a copy of
//! the transmitted bytes; the worker strips that prefix before delivery.

use std::io::{Read, Write};
use std::time::Duration;

use cctalk_types::{hex, EventSink, LoggingFlags};
use serialport::SerialPort;
use tokio::sync::{mpsc, oneshot};

use crate::{LinkError, INTER_BYTE_GAP};

/// ccTalk serial settings: 9600 baud, 8 data bits, no parity, 1 stop bit,
/// no flow control.
const BAUD_RATE: u32 = 9600;

/// Read chunk size; responses are at most 260 bytes plus echo.
const CHUNK: usize = 256;

pub(crate) enum WorkerCommand {
    Open { path: String, done: oneshot::Sender<Result<(), LinkError>> },
    Close,
    Send(SendJob),
}

pub(crate) struct SendJob {
    pub request_id: u64,
    pub bytes: Vec<u8>,
    pub expects_reply: bool,
    pub write_timeout: Duration,
    pub read_timeout: Duration,
    pub done: oneshot::Sender<Result<Vec<u8>, LinkError>>,
}

pub(crate) struct SerialWorker {
    port: Option<Box<dyn SerialPort>>,
    logging: LoggingFlags,
    sink: EventSink,
}

/// Spawn the worker thread and return its command queue. The thread exits
/// when the queue's last sender is dropped.
pub(crate) fn spawn(logging: LoggingFlags, sink: EventSink) -> mpsc::Sender<WorkerCommand> {
    let (tx, mut rx) = mpsc::channel::<WorkerCommand>(16);
    std::thread::Builder::new()
        .name("cctalk-serial".to_owned())
        .spawn(move || {
            let mut worker = SerialWorker { port: None, logging, sink };
            while let Some(command) = rx.blocking_recv() {
                match command {
                    WorkerCommand::Open { path, done } => {
                        let _ = done.send(worker.open(&path));
                    }
                    WorkerCommand::Close => worker.close(),
                    WorkerCommand::Send(job) => worker.send(job),
                }
            }
        })
        .expect("failed to spawn serial worker thread");
    tx
}

impl SerialWorker {
    fn open(&mut self, path: &str) -> Result<(), LinkError> {
        if self.port.is_some() {
            self.close();
        }

        self.sink.log(format!("* Opening port \"{path}\"."));

        match serialport::new(path, BAUD_RATE)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(500))
            .open()
        {
            Ok(port) => {
                self.port = Some(port);
                self.sink.log(format!("* Port \"{path}\" opened."));
                Ok(())
            }
            Err(err) => {
                let message = format!("{path}: {err}");
                self.sink.log(format!("! Can't open port {message}"));
                Err(LinkError::PortOpen(message))
            }
        }
    }

    fn close(&mut self) {
        if let Some(port) = self.port.take() {
            self.sink.log(format!(
                "* Port \"{}\" closed.",
                port.name().unwrap_or_default()
            ));
        }
    }

    fn send(&mut self, job: SendJob) {
        let outcome = self.exchange(&job);
        if let Err(error) = &outcome {
            match error {
                LinkError::RequestTimeout { .. } | LinkError::ResponseTimeout { .. } => {}
                other => self.sink.log(format!("! Serial port error: {other}")),
            }
        }
        let _ = job.done.send(outcome);
    }

    /// One blocking write plus bounded read. At 9600 baud each byte takes
    /// about 1.04 ms on the wire.
    fn exchange(&mut self, job: &SendJob) -> Result<Vec<u8>, LinkError> {
        let port = self.port.as_mut().ok_or(LinkError::PortClosed)?;

        if self.logging.serial_request {
            self.sink.log(format!("> Request: {}", hex(&job.bytes)));
        }

        port.set_timeout(job.write_timeout)
            .map_err(|e| LinkError::Port(e.to_string()))?;
        match port.write_all(&job.bytes) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::TimedOut => {
                let timeout_ms = job.write_timeout.as_millis() as u64;
                self.sink.log(format!(
                    "!> Request #{} write timeout ({timeout_ms}ms)",
                    job.request_id
                ));
                return Err(LinkError::RequestTimeout { request_id: job.request_id, timeout_ms });
            }
            Err(err) => return Err(LinkError::Port(err.to_string())),
        }

        if !job.expects_reply {
            return Ok(Vec::new());
        }

        let mut received = Vec::new();
        let mut chunk = [0u8; CHUNK];

        // First byte may take the whole response timeout.
        port.set_timeout(job.read_timeout)
            .map_err(|e| LinkError::Port(e.to_string()))?;
        match port.read(&mut chunk) {
            Ok(n) => received.extend_from_slice(&chunk[..n]),
            Err(err) if err.kind() == std::io::ErrorKind::TimedOut => {
                let timeout_ms = job.read_timeout.as_millis() as u64;
                self.sink.log(format!(
                    "!< Response #{} read timeout ({timeout_ms}ms)",
                    job.request_id
                ));
                return Err(LinkError::ResponseTimeout { request_id: job.request_id, timeout_ms });
            }
            Err(err) => return Err(LinkError::Port(err.to_string())),
        }

        // Subsequent chunks end after a quiet inter-byte gap.
        port.set_timeout(INTER_BYTE_GAP)
            .map_err(|e| LinkError::Port(e.to_string()))?;
        loop {
            match port.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => received.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == std::io::ErrorKind::TimedOut => break,
                Err(err) => return Err(LinkError::Port(err.to_string())),
            }
        }

        if self.logging.full_response {
            self.sink.log(format!("< Full response: {}", hex(&received)));
        }

        let response = strip_echo(&job.bytes, received);

        if self.logging.serial_response {
            self.sink.log(format!("< Response: {}", hex(&response)));
        }

        Ok(response)
    }
}

/// Drop the local-echo prefix from a receive buffer.
///
/// The echo must match the transmitted bytes exactly; anything else is
/// surfaced whole so frame validation can report what actually arrived.
fn strip_echo(sent: &[u8], received: Vec<u8>) -> Vec<u8> {
    if received.starts_with(sent) {
        received[sent.len()..].to_vec()
    } else {
        received
    }
}
