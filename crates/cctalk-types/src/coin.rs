//! Coin acceptor event codes and their accept/reject classification.
//!
//! These codes arrive in result byte B of `ReadBufferedCredit` entries whose
//! result byte A is 0.

/// Event code reported by a coin acceptor in place of a credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoinEventCode {
    NoError,
    RejectCoin,
    InhibitedCoin,
    MultipleWindow,
    WakeupTimeout,
    ValidationTimeout,
    CreditSensorTimeout,
    SorterOptoTimeout,
    SecondCloseCoinError,
    AcceptGateNotReady,
    CreditSensorNotReady,
    SorterNotReady,
    RejectCoinNotCleared,
    ValidationSensorNotReady,
    CreditSensorBlocked,
    SorterOptoBlocked,
    CreditSequenceError,
    CoinGoingBackwards,
    CoinTooFastOverCreditSensor,
    CoinTooSlowOverCreditSensor,
    CosMechanismActivated,
    DceOptoTimeout,
    DceOptoNotSeen,
    CreditSensorReachedTooEarly,
    RejectCoinRepeatedSequentialTrip,
    RejectSlug,
    RejectSensorBlocked,
    GamesOverload,
    MaxCoinMeterPulsesExceeded,
    AcceptGateOpenNotClosed,
    AcceptGateClosedNotOpen,
    ManifoldOptoTimeout,
    ManifoldOptoBlocked,
    ManifoldNotReady,
    SecurityStatusChanged,
    MotorException,
    SwallowedCoin,
    CoinTooFastOverValidationSensor,
    CoinTooSlowOverValidationSensor,
    CoinIncorrectlySorted,
    ExternalLightAttack,
    /// Inhibited coin type 1-32, bytes 128-159.
    InhibitedCoinType(u8),
    /// Reserved credit-cancelling range, bytes 160-191, raw byte kept.
    ReservedCreditCancelling(u8),
    DataBlockRequest,
    CoinReturnMechanismActivated,
    UnspecifiedAlarmCode,
    /// A byte outside the specified table.
    Unknown(u8),
}

/// What a coin event code implies about the coin that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoinDisposition {
    /// The coin was (or may well have been) accepted.
    Accepted,
    /// The coin was rejected back to the customer.
    Rejected,
    /// The outcome cannot be determined; the device may be faulty.
    Unknown,
}

impl CoinEventCode {
    pub fn from_wire(byte: u8) -> CoinEventCode {
        match byte {
            0 => CoinEventCode::NoError,
            1 => CoinEventCode::RejectCoin,
            2 => CoinEventCode::InhibitedCoin,
            3 => CoinEventCode::MultipleWindow,
            4 => CoinEventCode::WakeupTimeout,
            5 => CoinEventCode::ValidationTimeout,
            6 => CoinEventCode::CreditSensorTimeout,
            7 => CoinEventCode::SorterOptoTimeout,
            8 => CoinEventCode::SecondCloseCoinError,
            9 => CoinEventCode::AcceptGateNotReady,
            10 => CoinEventCode::CreditSensorNotReady,
            11 => CoinEventCode::SorterNotReady,
            12 => CoinEventCode::RejectCoinNotCleared,
            13 => CoinEventCode::ValidationSensorNotReady,
            14 => CoinEventCode::CreditSensorBlocked,
            15 => CoinEventCode::SorterOptoBlocked,
            16 => CoinEventCode::CreditSequenceError,
            17 => CoinEventCode::CoinGoingBackwards,
            18 => CoinEventCode::CoinTooFastOverCreditSensor,
            19 => CoinEventCode::CoinTooSlowOverCreditSensor,
            20 => CoinEventCode::CosMechanismActivated,
            21 => CoinEventCode::DceOptoTimeout,
            22 => CoinEventCode::DceOptoNotSeen,
            23 => CoinEventCode::CreditSensorReachedTooEarly,
            24 => CoinEventCode::RejectCoinRepeatedSequentialTrip,
            25 => CoinEventCode::RejectSlug,
            26 => CoinEventCode::RejectSensorBlocked,
            27 => CoinEventCode::GamesOverload,
            28 => CoinEventCode::MaxCoinMeterPulsesExceeded,
            29 => CoinEventCode::AcceptGateOpenNotClosed,
            30 => CoinEventCode::AcceptGateClosedNotOpen,
            31 => CoinEventCode::ManifoldOptoTimeout,
            32 => CoinEventCode::ManifoldOptoBlocked,
            33 => CoinEventCode::ManifoldNotReady,
            34 => CoinEventCode::SecurityStatusChanged,
            35 => CoinEventCode::MotorException,
            36 => CoinEventCode::SwallowedCoin,
            37 => CoinEventCode::CoinTooFastOverValidationSensor,
            38 => CoinEventCode::CoinTooSlowOverValidationSensor,
            39 => CoinEventCode::CoinIncorrectlySorted,
            40 => CoinEventCode::ExternalLightAttack,
            128..=159 => CoinEventCode::InhibitedCoinType(byte - 127),
            160..=191 => CoinEventCode::ReservedCreditCancelling(byte),
            253 => CoinEventCode::DataBlockRequest,
            254 => CoinEventCode::CoinReturnMechanismActivated,
            255 => CoinEventCode::UnspecifiedAlarmCode,
            other => CoinEventCode::Unknown(other),
        }
    }

    /// Classify the event per the ccTalk tables.
    ///
    /// The sets are fixed by the ccTalk specification; an event outside
    /// both the accepted and unknown sets means the coin was rejected.
    pub fn disposition(self) -> CoinDisposition {
        use CoinEventCode::*;

        match self {
            NoError
            | SorterOptoTimeout
            | CreditSequenceError
            | CoinGoingBackwards
            | CoinTooFastOverCreditSensor
            | CoinTooSlowOverCreditSensor
            | CosMechanismActivated
            | CreditSensorReachedTooEarly
            | RejectSensorBlocked
            | GamesOverload
            | MaxCoinMeterPulsesExceeded
            | AcceptGateOpenNotClosed
            | ManifoldOptoTimeout
            | SwallowedCoin
            | CoinIncorrectlySorted
            | ExternalLightAttack
            | DataBlockRequest
            | CoinReturnMechanismActivated
            | UnspecifiedAlarmCode => CoinDisposition::Accepted,

            WakeupTimeout
            | ValidationTimeout
            | CreditSensorTimeout
            | DceOptoTimeout
            | SecurityStatusChanged
            | MotorException
            | ReservedCreditCancelling(_)
            | Unknown(_) => CoinDisposition::Unknown,

            RejectCoin
            | InhibitedCoin
            | MultipleWindow
            | SecondCloseCoinError
            | AcceptGateNotReady
            | CreditSensorNotReady
            | SorterNotReady
            | RejectCoinNotCleared
            | ValidationSensorNotReady
            | CreditSensorBlocked
            | SorterOptoBlocked
            | DceOptoNotSeen
            | RejectCoinRepeatedSequentialTrip
            | RejectSlug
            | AcceptGateClosedNotOpen
            | ManifoldOptoBlocked
            | ManifoldNotReady
            | CoinTooFastOverValidationSensor
            | CoinTooSlowOverValidationSensor
            | InhibitedCoinType(_) => CoinDisposition::Rejected,
        }
    }
}

impl std::fmt::Display for CoinEventCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoinEventCode::InhibitedCoinType(n) => write!(f, "InhibitedCoinType{n}"),
            CoinEventCode::ReservedCreditCancelling(byte) => {
                write!(f, "ReservedCreditCancelling({byte})")
            }
            CoinEventCode::Unknown(byte) => write!(f, "Unknown coin event code {byte}"),
            other => write!(f, "{other:?}"),
        }
    }
}

impl std::fmt::Display for CoinDisposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CoinDisposition::Accepted => "Accepted",
            CoinDisposition::Rejected => "Rejected",
            CoinDisposition::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}
