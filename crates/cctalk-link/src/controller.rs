//! The link controller: builds frames, assigns request ids, and validates
//! replies, with a single request in flight at any time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use cctalk_framing::Frame;
use cctalk_types::{hex, DeviceConfig, EventSink, Header};
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::worker::{self, SendJob, WorkerCommand};
use crate::{write_timeout_for, Link, LinkError, Reply};

/// Monotonic request id source. Ids start at 1; 0 is reserved for "nothing
/// was sent" and is skipped on wraparound.
pub(crate) struct RequestIdGenerator {
    next: AtomicU64,
}

impl RequestIdGenerator {
    pub(crate) fn new() -> RequestIdGenerator {
        RequestIdGenerator { next: AtomicU64::new(1) }
    }

    pub(crate) fn next_id(&self) -> u64 {
        loop {
            let id = self.next.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }
}

/// ccTalk link controller for one serial bus device.
///
/// Owns the serial worker thread for the port. All command traffic goes
/// through [`Link::transact`], which serializes callers so the half-duplex
/// bus never sees two requests at once.
pub struct LinkController {
    worker_tx: mpsc::Sender<WorkerCommand>,
    /// Held across one whole write-read exchange.
    in_flight: Mutex<()>,
    ids: RequestIdGenerator,
    serial_device: String,
    device_address: u8,
    checksum_16bit: bool,
    des_encrypted: bool,
    cctalk_request_log: bool,
    cctalk_response_log: bool,
    sink: EventSink,
}

impl LinkController {
    /// Create a controller and its worker thread. The port is not touched
    /// until [`Link::open`] is called.
    pub fn new(config: &DeviceConfig, sink: EventSink) -> LinkController {
        let worker_tx = worker::spawn(config.logging, sink.clone());
        LinkController {
            worker_tx,
            in_flight: Mutex::new(()),
            ids: RequestIdGenerator::new(),
            serial_device: config.serial_device.clone(),
            device_address: config.address,
            checksum_16bit: config.checksum_16bit,
            des_encrypted: config.des_encrypted,
            cctalk_request_log: config.logging.cctalk_request,
            cctalk_response_log: config.logging.cctalk_response,
            sink,
        }
    }

    fn refuse_unsupported(&self) -> Result<(), LinkError> {
        if self.des_encrypted {
            self.sink.log("! ccTalk encryption requested, unsupported. Aborting request.");
            return Err(LinkError::Unsupported("DES-encrypted frames"));
        }
        if self.checksum_16bit {
            self.sink.log("! ccTalk 16-bit CRC checksums requested, unsupported. Aborting request.");
            return Err(LinkError::Unsupported("16-bit CRC checksums"));
        }
        Ok(())
    }
}

impl Link for LinkController {
    async fn transact(
        &self,
        header: Header,
        payload: Vec<u8>,
        response_timeout: Duration,
    ) -> Result<Reply, LinkError> {
        self.refuse_unsupported()?;

        if self.cctalk_request_log {
            let data = if payload.is_empty() { "(empty)".to_owned() } else { hex(&payload) };
            self.sink.log(format!(
                "> ccTalk request: {}, address: {}, data: {}",
                header.name(),
                self.device_address,
                data
            ));
        }

        let bytes = Frame::request(self.device_address, header.wire(), payload).encode();
        let write_timeout = write_timeout_for(bytes.len());

        let _guard = self.in_flight.lock().await;
        let request_id = self.ids.next_id();
        let (done_tx, done_rx) = oneshot::channel();
        let job = SendJob {
            request_id,
            bytes,
            expects_reply: true,
            write_timeout,
            read_timeout: response_timeout,
            done: done_tx,
        };
        self.worker_tx
            .send(WorkerCommand::Send(job))
            .await
            .map_err(|_| LinkError::WorkerGone)?;
        let raw = done_rx.await.map_err(|_| LinkError::WorkerGone)??;

        let frame = Frame::decode(&raw)
            .and_then(|frame| frame.validate_reply(self.device_address).map(|()| frame))
            .map_err(|source| {
                let error = LinkError::Structure { request_id, source };
                self.sink.log(format!("! {error}"));
                error
            })?;

        if self.cctalk_response_log {
            let data = if frame.payload.is_empty() { "(empty)".to_owned() } else { hex(&frame.payload) };
            // The request id is left out so identical responses can be
            // collapsed by the host's log sink.
            self.sink.log(format!(
                "< ccTalk response from address {}, data: {}",
                frame.source, data
            ));
        }

        Ok(Reply { request_id, data: frame.payload })
    }

    async fn open(&self) -> Result<(), LinkError> {
        self.refuse_unsupported()?;
        let (done_tx, done_rx) = oneshot::channel();
        self.worker_tx
            .send(WorkerCommand::Open { path: self.serial_device.clone(), done: done_tx })
            .await
            .map_err(|_| LinkError::WorkerGone)?;
        done_rx.await.map_err(|_| LinkError::WorkerGone)?
    }

    async fn close(&self) {
        let _ = self.worker_tx.send(WorkerCommand::Close).await;
    }
}
