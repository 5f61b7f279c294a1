//! Bill validator event codes, routing commands, and their classification.

/// Status/error code reported by a bill validator when result byte A is 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillStatusCode {
    MasterInhibitActive,
    BillReturnedFromEscrow,
    InvalidBillValidationFail,
    InvalidBillTransportProblem,
    InhibitedBillOnSerial,
    InhibitedBillOnDipSwitches,
    BillJammedInTransportUnsafeMode,
    BillJammedInStacker,
    BillPulledBackwards,
    BillTamper,
    StackerOk,
    StackerRemoved,
    StackerInserted,
    StackerFaulty,
    StackerFull,
    StackerJammed,
    BillJammedInTransportSafeMode,
    OptoFraudDetected,
    StringFraudDetected,
    AntiStringMechanismFaulty,
    BarcodeDetected,
    UnknownBillTypeStacked,
    /// A byte outside the specified table.
    Unknown(u8),
}

/// Broad class of a bill validator status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillEventKind {
    /// Informational only.
    Status,
    /// Bill rejected and returned to the customer.
    Reject,
    /// Fraud detected; possible machine alarm.
    FraudAttempt,
    /// Service callout.
    FatalError,
}

impl BillStatusCode {
    pub fn from_wire(byte: u8) -> BillStatusCode {
        match byte {
            0 => BillStatusCode::MasterInhibitActive,
            1 => BillStatusCode::BillReturnedFromEscrow,
            2 => BillStatusCode::InvalidBillValidationFail,
            3 => BillStatusCode::InvalidBillTransportProblem,
            4 => BillStatusCode::InhibitedBillOnSerial,
            5 => BillStatusCode::InhibitedBillOnDipSwitches,
            6 => BillStatusCode::BillJammedInTransportUnsafeMode,
            7 => BillStatusCode::BillJammedInStacker,
            8 => BillStatusCode::BillPulledBackwards,
            9 => BillStatusCode::BillTamper,
            10 => BillStatusCode::StackerOk,
            11 => BillStatusCode::StackerRemoved,
            12 => BillStatusCode::StackerInserted,
            13 => BillStatusCode::StackerFaulty,
            14 => BillStatusCode::StackerFull,
            15 => BillStatusCode::StackerJammed,
            16 => BillStatusCode::BillJammedInTransportSafeMode,
            17 => BillStatusCode::OptoFraudDetected,
            18 => BillStatusCode::StringFraudDetected,
            19 => BillStatusCode::AntiStringMechanismFaulty,
            20 => BillStatusCode::BarcodeDetected,
            21 => BillStatusCode::UnknownBillTypeStacked,
            other => BillStatusCode::Unknown(other),
        }
    }

    /// Classify the status code. Unknown bytes classify as `FatalError` so
    /// they trigger a self-check rather than being silently ignored.
    pub fn kind(self) -> BillEventKind {
        use BillStatusCode::*;

        match self {
            MasterInhibitActive | BillReturnedFromEscrow | InhibitedBillOnSerial
            | InhibitedBillOnDipSwitches | StackerOk | StackerRemoved | StackerInserted
            | StackerFull | BarcodeDetected | UnknownBillTypeStacked => BillEventKind::Status,

            InvalidBillValidationFail | InvalidBillTransportProblem => BillEventKind::Reject,

            BillPulledBackwards | BillTamper | OptoFraudDetected | StringFraudDetected => {
                BillEventKind::FraudAttempt
            }

            BillJammedInTransportUnsafeMode | BillJammedInStacker | StackerFaulty
            | StackerJammed | BillJammedInTransportSafeMode | AntiStringMechanismFaulty
            | Unknown(_) => BillEventKind::FatalError,
        }
    }
}

/// Success code reported when result byte A is a bill position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillSuccessCode {
    /// Bill accepted; credit the customer.
    ValidatedAndAccepted,
    /// Bill held in escrow, waiting for a routing decision.
    ValidatedAndHeldInEscrow,
    /// A byte outside the specified table.
    Unknown(u8),
}

impl BillSuccessCode {
    pub fn from_wire(byte: u8) -> BillSuccessCode {
        match byte {
            0 => BillSuccessCode::ValidatedAndAccepted,
            1 => BillSuccessCode::ValidatedAndHeldInEscrow,
            other => BillSuccessCode::Unknown(other),
        }
    }
}

/// Parameter of the `RouteBill` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteCommand {
    /// Reject: return the bill to the customer.
    ReturnBill,
    /// Accept: route the bill into the stacker.
    RouteToStacker,
    /// Give the host more time to decide.
    IncreaseTimeout,
}

impl RouteCommand {
    pub fn wire(self) -> u8 {
        match self {
            RouteCommand::ReturnBill => 0,
            RouteCommand::RouteToStacker => 1,
            RouteCommand::IncreaseTimeout => 255,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RouteCommand::ReturnBill => "ReturnBill",
            RouteCommand::RouteToStacker => "RouteToStacker",
            RouteCommand::IncreaseTimeout => "IncreaseTimeout",
        }
    }
}

impl std::fmt::Display for RouteCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of the `RouteBill` command. An ACK reply means `Routed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteStatus {
    Routed,
    /// The escrow is empty, nothing to route.
    EscrowEmpty,
    FailedToRoute,
    /// A byte outside the specified table.
    Unknown(u8),
}

impl RouteStatus {
    pub fn from_wire(byte: u8) -> RouteStatus {
        match byte {
            0 => RouteStatus::Routed,
            254 => RouteStatus::EscrowEmpty,
            255 => RouteStatus::FailedToRoute,
            other => RouteStatus::Unknown(other),
        }
    }
}

impl std::fmt::Display for RouteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteStatus::Unknown(byte) => write!(f, "Unknown route status {byte}"),
            other => write!(f, "{other:?}"),
        }
    }
}

impl std::fmt::Display for BillStatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BillStatusCode::Unknown(byte) => write!(f, "Unknown bill status code {byte}"),
            other => write!(f, "{other:?}"),
        }
    }
}

impl std::fmt::Display for BillEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BillEventKind::Status => "Status",
            BillEventKind::Reject => "Reject",
            BillEventKind::FraudAttempt => "FraudAttempt",
            BillEventKind::FatalError => "FatalError",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_round_trip() {
        assert_eq!(BillStatusCode::from_wire(0), BillStatusCode::MasterInhibitActive);
        assert_eq!(BillStatusCode::from_wire(21), BillStatusCode::UnknownBillTypeStacked);
        assert_eq!(BillStatusCode::from_wire(200), BillStatusCode::Unknown(200));
    }

    #[test]
    fn test_status_kinds() {
        assert_eq!(BillStatusCode::MasterInhibitActive.kind(), BillEventKind::Status);
        assert_eq!(BillStatusCode::BillReturnedFromEscrow.kind(), BillEventKind::Status);
        assert_eq!(BillStatusCode::InvalidBillValidationFail.kind(), BillEventKind::Reject);
        assert_eq!(BillStatusCode::BillTamper.kind(), BillEventKind::FraudAttempt);
        assert_eq!(BillStatusCode::StackerJammed.kind(), BillEventKind::FatalError);
        // StackerFull is informational, not fatal.
        assert_eq!(BillStatusCode::StackerFull.kind(), BillEventKind::Status);
        assert_eq!(BillStatusCode::Unknown(99).kind(), BillEventKind::FatalError);
    }

    #[test]
    fn test_success_codes() {
        assert_eq!(BillSuccessCode::from_wire(0), BillSuccessCode::ValidatedAndAccepted);
        assert_eq!(BillSuccessCode::from_wire(1), BillSuccessCode::ValidatedAndHeldInEscrow);
        assert_eq!(BillSuccessCode::from_wire(7), BillSuccessCode::Unknown(7));
    }

    #[test]
    fn test_route_bytes() {
        assert_eq!(RouteCommand::ReturnBill.wire(), 0);
        assert_eq!(RouteCommand::RouteToStacker.wire(), 1);
        assert_eq!(RouteCommand::IncreaseTimeout.wire(), 255);
        assert_eq!(RouteStatus::from_wire(0), RouteStatus::Routed);
        assert_eq!(RouteStatus::from_wire(254), RouteStatus::EscrowEmpty);
        assert_eq!(RouteStatus::from_wire(255), RouteStatus::FailedToRoute);
        assert_eq!(RouteStatus::from_wire(3), RouteStatus::Unknown(3));
    }
}
