//! Typed wrappers over the ccTalk headers the driver uses.
//!
//! Each wrapper builds its payload, runs one link transaction, and decodes
//! the reply into a domain value. Commands that answer with an ACK require
//! an empty reply payload; anything else is a decode error. Decode errors
//! are surfaced to the host once, as a `ResponseDecodeError` event tagged
//! with the request id.

use cctalk_link::{Link, LinkError, DEFAULT_RESPONSE_TIMEOUT};
use cctalk_types::{
    hex, Category, CountryScaling, DeviceEvent, EventSink, FaultCode, Header, RawEvent,
    RouteCommand, RouteStatus,
};
use thiserror::Error;

/// Millisecond multiplier for a `GetPollingPriority` unit byte.
///
/// Unit 0 means "special" (0,0 is "see device docs", 0,255 is a hardware
/// poll line); units above 9 are undefined and fall back to 1.
fn polling_unit_multiplier(unit: u8) -> u64 {
    match unit {
        0 => 0,
        1 => 1,
        2 => 10,
        3 => 1000,
        4 => 1000 * 60,
        5 => 1000 * 60 * 60,
        6 => 1000 * 60 * 60 * 24,
        7 => 1000 * 60 * 60 * 24 * 7,
        8 => 1000 * 60 * 60 * 24 * 7 * 30,
        9 => 1000 * 31_557_600,
        _ => 1,
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error("response #{request_id} decode error: {message}")]
    Decode { request_id: u64, message: String },
}

impl CommandError {
    /// A response read timeout; per ccTalk semantics the polling command
    /// treats this as "no news" rather than an error.
    pub fn is_response_timeout(&self) -> bool {
        matches!(self, CommandError::Link(link) if link.is_response_timeout())
    }
}

/// The command layer for one device.
pub struct Commands<L> {
    link: L,
    sink: EventSink,
}

impl<L: Link> Commands<L> {
    pub fn new(link: L, sink: EventSink) -> Commands<L> {
        Commands { link, sink }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    async fn transact(&self, header: Header, payload: Vec<u8>) -> Result<cctalk_link::Reply, CommandError> {
        Ok(self.link.transact(header, payload, DEFAULT_RESPONSE_TIMEOUT).await?)
    }

    /// Build a decode error: logged, surfaced as an event, returned.
    async fn decode_failure(&self, request_id: u64, message: String) -> CommandError {
        self.sink.log(format!("! {message}"));
        self.sink
            .emit(DeviceEvent::ResponseDecodeError { request_id, message: message.clone() })
            .await;
        CommandError::Decode { request_id, message }
    }

    async fn ack(&self, header: Header, payload: Vec<u8>) -> Result<(), CommandError> {
        let reply = self.transact(header, payload).await?;
        if !reply.data.is_empty() {
            return Err(self
                .decode_failure(
                    reply.request_id,
                    "Non-empty data received while waiting for ACK.".to_owned(),
                )
                .await);
        }
        Ok(())
    }

    async fn ascii(&self, header: Header) -> Result<String, CommandError> {
        let reply = self.transact(header, Vec::new()).await?;
        Ok(String::from_utf8_lossy(&reply.data).into_owned())
    }

    /// `SimplePoll`: the alive check.
    pub async fn simple_poll(&self) -> Result<(), CommandError> {
        match self.ack(Header::SimplePoll, Vec::new()).await {
            Ok(()) => {
                self.sink.log("* Device is alive (answered to simple poll)");
                Ok(())
            }
            Err(error) => {
                self.sink
                    .log(format!("! Error checking for device alive status (simple poll): {error}"));
                Err(error)
            }
        }
    }

    /// `GetEquipmentCategory`: parsed category plus the raw reported name.
    pub async fn equipment_category(&self) -> Result<(Category, String), CommandError> {
        let name = self.ascii(Header::GetEquipmentCategory).await?;
        Ok((Category::from_reported_name(&name), name))
    }

    pub async fn product_code(&self) -> Result<String, CommandError> {
        self.ascii(Header::GetProductCode).await
    }

    pub async fn build_code(&self) -> Result<String, CommandError> {
        self.ascii(Header::GetBuildCode).await
    }

    pub async fn manufacturer(&self) -> Result<String, CommandError> {
        self.ascii(Header::GetManufacturer).await
    }

    /// `GetSerialNumber`: the serial is binary (usually 3 bytes), reported
    /// as hex.
    pub async fn serial_number(&self) -> Result<String, CommandError> {
        let reply = self.transact(Header::GetSerialNumber, Vec::new()).await?;
        Ok(hex(&reply.data))
    }

    pub async fn software_revision(&self) -> Result<String, CommandError> {
        self.ascii(Header::GetSoftwareRevision).await
    }

    /// `GetCommsRevision`: (release, major, minor).
    pub async fn comms_revision(&self) -> Result<(u8, u8, u8), CommandError> {
        let reply = self.transact(Header::GetCommsRevision, Vec::new()).await?;
        match reply.data.as_slice() {
            &[release, major, minor] => Ok((release, major, minor)),
            _ => Err(self
                .decode_failure(reply.request_id, "Invalid comms revision data received.".to_owned())
                .await),
        }
    }

    /// `GetPollingPriority`: the recommended polling interval in
    /// milliseconds. 0 means "see device docs"; the caller applies the
    /// clamping policy.
    pub async fn polling_priority(&self) -> Result<u64, CommandError> {
        let reply = match self.transact(Header::GetPollingPriority, Vec::new()).await {
            Ok(reply) => reply,
            Err(error) => {
                self.sink.log(format!("! Error getting polling interval: {error}"));
                return Err(error);
            }
        };
        match reply.data.as_slice() {
            &[unit, value] => Ok(polling_unit_multiplier(unit) * u64::from(value)),
            _ => Err(self
                .decode_failure(reply.request_id, "Invalid polling interval data received.".to_owned())
                .await),
        }
    }

    /// `SetInhibitStatus`: per-position enable masks, 16 positions total.
    pub async fn set_inhibit_status(&self, mask1: u8, mask2: u8) -> Result<(), CommandError> {
        match self.ack(Header::SetInhibitStatus, vec![mask1, mask2]).await {
            Ok(()) => {
                self.sink.log(format!("* Inhibit status set: {mask1}, {mask2}"));
                Ok(())
            }
            Err(error) => {
                self.sink.log(format!("! Error setting inhibit status: {error}"));
                Err(error)
            }
        }
    }

    /// `SetMasterInhibitStatus`: the wire byte is 0 for "inhibit active".
    pub async fn set_master_inhibit(&self, inhibit: bool) -> Result<(), CommandError> {
        let payload = vec![if inhibit { 0 } else { 1 }];
        match self.ack(Header::SetMasterInhibitStatus, payload).await {
            Ok(()) => {
                self.sink.log(format!(
                    "* Master inhibit status set to: {}",
                    if inhibit { "reject" } else { "accept" }
                ));
                Ok(())
            }
            Err(error) => {
                self.sink.log(format!("! Error setting master inhibit status: {error}"));
                Err(error)
            }
        }
    }

    /// `GetMasterInhibitStatus`: true means inhibit active.
    pub async fn master_inhibit_status(&self) -> Result<bool, CommandError> {
        let reply = self.transact(Header::GetMasterInhibitStatus, Vec::new()).await?;
        match reply.data.as_slice() {
            &[byte] => {
                let inhibit = byte == 0;
                self.sink.log(format!(
                    "* Master inhibit status: {}",
                    if inhibit { "reject" } else { "accept" }
                ));
                Ok(inhibit)
            }
            _ => Err(self
                .decode_failure(
                    reply.request_id,
                    "Invalid data received for GetMasterInhibitStatus.".to_owned(),
                )
                .await),
        }
    }

    /// `SetBillOperatingMode`: B0 use stacker, B1 use escrow.
    pub async fn set_bill_operating_mode(
        &self,
        use_stacker: bool,
        use_escrow: bool,
    ) -> Result<(), CommandError> {
        let mask = u8::from(use_stacker) | (u8::from(use_escrow) << 1);
        match self.ack(Header::SetBillOperatingMode, vec![mask]).await {
            Ok(()) => {
                self.sink.log(format!("* Bill validator operating mode set to: {mask}"));
                Ok(())
            }
            Err(error) => {
                self.sink
                    .log(format!("! Error setting bill validator operating mode: {error}"));
                Err(error)
            }
        }
    }

    /// `GetVariableSet`: for bill validators the first byte is the number
    /// of bill types supported. `None` when the device does not provide a
    /// usable count.
    pub async fn bill_type_count(&self) -> Result<Option<u8>, CommandError> {
        let reply = self.transact(Header::GetVariableSet, Vec::new()).await?;
        if reply.data.len() < 2 {
            self.sink.log("! Invalid variable set data returned for bill validator.");
            return Ok(None);
        }
        let count = reply.data[0];
        Ok((count > 1).then_some(count))
    }

    /// `GetCoinId`: raw ASCII identifier at `position` (1-16).
    pub async fn coin_id(&self, position: u8) -> Result<Vec<u8>, CommandError> {
        let reply = self.transact(Header::GetCoinId, vec![position]).await?;
        Ok(reply.data)
    }

    /// `GetBillId`: raw ASCII identifier at `position`.
    pub async fn bill_id(&self, position: u8) -> Result<Vec<u8>, CommandError> {
        let reply = self.transact(Header::GetBillId, vec![position]).await?;
        Ok(reply.data)
    }

    /// `GetCountryScalingFactor` for a two-letter country code. An
    /// all-zero reply means the country is unsupported.
    pub async fn country_scaling(&self, country: &str) -> Result<CountryScaling, CommandError> {
        let reply = self
            .transact(Header::GetCountryScalingFactor, country.as_bytes().to_vec())
            .await?;
        match reply.data.as_slice() {
            &[lsb, msb, decimals] => Ok(CountryScaling {
                scaling_factor: u16::from(lsb) + 256 * u16::from(msb),
                decimal_places: decimals,
            }),
            _ => Err(self
                .decode_failure(
                    reply.request_id,
                    format!("Invalid scaling data for country {country}."),
                )
                .await),
        }
    }

    /// The polling command: `ReadBufferedCredit` for coin acceptors,
    /// `ReadBufferedBillEvents` for bill validators.
    ///
    /// Returns the event counter and the buffered entries, newest first.
    /// `None` means the device replied with an empty payload, which per
    /// ccTalk semantics is a command timeout and not an error.
    pub async fn buffered_credit_events(
        &self,
        category: Category,
    ) -> Result<Option<(u8, Vec<RawEvent>)>, CommandError> {
        let (header, coin_bill) = if category == Category::CoinAcceptor {
            (Header::ReadBufferedCredit, "Coin")
        } else {
            (Header::ReadBufferedBillEvents, "Bill")
        };

        let reply = match self.transact(header, Vec::new()).await {
            Ok(reply) => reply,
            Err(error) => {
                if !error.is_response_timeout() {
                    self.sink
                        .log(format!("! Error getting {coin_bill} buffered credit / events: {error}"));
                }
                return Err(error);
            }
        };

        if reply.data.is_empty() {
            return Ok(None);
        }
        if reply.data.len() % 2 != 1 {
            return Err(self
                .decode_failure(
                    reply.request_id,
                    format!(
                        "Invalid {coin_bill} buffered credit / event data size received, unexpected size: {}.",
                        reply.data.len()
                    ),
                )
                .await);
        }

        let counter = reply.data[0];
        let events = reply.data[1..]
            .chunks_exact(2)
            .map(|pair| RawEvent::new(pair[0], pair[1]))
            .collect();
        Ok(Some((counter, events)))
    }

    /// `RouteBill`: decide the fate of the bill held in escrow.
    pub async fn route_bill(&self, route: RouteCommand) -> Result<RouteStatus, CommandError> {
        let reply = match self.transact(Header::RouteBill, vec![route.wire()]).await {
            Ok(reply) => reply,
            Err(error) => {
                self.sink.log(format!("! Error sending RouteBill command: {error}"));
                return Err(error);
            }
        };
        let status = match reply.data.as_slice() {
            [] => RouteStatus::Routed,
            &[byte] => RouteStatus::from_wire(byte),
            _ => {
                return Err(self
                    .decode_failure(reply.request_id, "Invalid data received for RouteBill.".to_owned())
                    .await)
            }
        };
        self.sink.log(format!("* RouteBill command status: {status}"));
        Ok(status)
    }

    /// `PerformSelfCheck`: the current fault code, `Ok` when healthy.
    pub async fn self_check(&self) -> Result<FaultCode, CommandError> {
        let reply = match self.transact(Header::PerformSelfCheck, Vec::new()).await {
            Ok(reply) => reply,
            Err(error) => {
                self.sink.log(format!("! Error getting self-check status: {error}"));
                return Err(error);
            }
        };
        match reply.data.as_slice() {
            &[byte] => {
                let fault = FaultCode::from_wire(byte);
                self.sink.log(format!("* Self-check fault code: {fault}"));
                Ok(fault)
            }
            _ => Err(self
                .decode_failure(reply.request_id, "Invalid data received for PerformSelfCheck.".to_owned())
                .await),
        }
    }

    /// `ResetDevice`: soft reset. The device needs a device-specific
    /// settling time after the ACK before it answers again.
    pub async fn reset_device(&self) -> Result<(), CommandError> {
        match self.ack(Header::ResetDevice, Vec::new()).await {
            Ok(()) => {
                self.sink
                    .log("* Soft reset acknowledged, waiting for the device to get back up.");
                Ok(())
            }
            Err(error) => {
                self.sink.log(format!("! Error sending soft reset request: {error}"));
                Err(error)
            }
        }
    }

}
