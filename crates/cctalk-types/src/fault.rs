//! Fault codes, as returned by `PerformSelfCheck`.
//!
//! Some codes carry extra detail in a second byte (coil number, hopper
//! number, slave address); the driver does not interpret that byte.

/// Self-check fault code. `Ok` means no fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCode {
    Ok,
    EepromChecksumCorrupted,
    FaultOnInductiveCoils,
    FaultOnCreditSensor,
    FaultOnPiezoSensor,
    FaultOnReflectiveSensor,
    FaultOnDiameterSensor,
    FaultOnWakeUpSensor,
    FaultOnSorterExitSensors,
    NvramChecksumCorrupted,
    CoinDispensingError,
    LowLevelSensorError,
    HighLevelSensorError,
    CoinCountingError,
    KeypadError,
    ButtonError,
    DisplayError,
    CoinAuditingError,
    FaultOnRejectSensor,
    FaultOnCoinReturnMechanism,
    FaultOnCosMechanism,
    FaultOnRimSensor,
    FaultOnThermistor,
    PayoutMotorFault,
    PayoutTimeout,
    PayoutJammed,
    PayoutSensorFault,
    LevelSensorError,
    PersonalityModuleNotFitted,
    PersonalityChecksumCorrupted,
    RomChecksumMismatch,
    MissingSlaveDevice,
    InternalCommsBad,
    SupplyVoltageOutsideOperatingLimits,
    TemperatureOutsideOperatingLimits,
    DceFault,
    FaultOnBillValidatorSensor,
    FaultOnBillTransportMotor,
    FaultOnStacker,
    BillJammed,
    RamTestFail,
    FaultOnStringSensor,
    AcceptGateFailedOpen,
    AcceptGateFailedClosed,
    StackerMissing,
    StackerFull,
    FlashMemoryEraseFail,
    FlashMemoryWriteFail,
    SlaveDeviceNotResponding,
    FaultOnOptoSensor,
    BatteryFault,
    DoorOpen,
    MicroswitchFault,
    RtcFault,
    FirmwareError,
    InitialisationError,
    SupplyCurrentOutsideOperatingLimits,
    ForcedBootloaderMode,
    UnspecifiedFaultCode,
    /// A byte outside the specified table.
    Unknown(u8),
}

impl FaultCode {
    pub fn from_wire(byte: u8) -> FaultCode {
        match byte {
            0 => FaultCode::Ok,
            1 => FaultCode::EepromChecksumCorrupted,
            2 => FaultCode::FaultOnInductiveCoils,
            3 => FaultCode::FaultOnCreditSensor,
            4 => FaultCode::FaultOnPiezoSensor,
            5 => FaultCode::FaultOnReflectiveSensor,
            6 => FaultCode::FaultOnDiameterSensor,
            7 => FaultCode::FaultOnWakeUpSensor,
            8 => FaultCode::FaultOnSorterExitSensors,
            9 => FaultCode::NvramChecksumCorrupted,
            10 => FaultCode::CoinDispensingError,
            11 => FaultCode::LowLevelSensorError,
            12 => FaultCode::HighLevelSensorError,
            13 => FaultCode::CoinCountingError,
            14 => FaultCode::KeypadError,
            15 => FaultCode::ButtonError,
            16 => FaultCode::DisplayError,
            17 => FaultCode::CoinAuditingError,
            18 => FaultCode::FaultOnRejectSensor,
            19 => FaultCode::FaultOnCoinReturnMechanism,
            20 => FaultCode::FaultOnCosMechanism,
            21 => FaultCode::FaultOnRimSensor,
            22 => FaultCode::FaultOnThermistor,
            23 => FaultCode::PayoutMotorFault,
            24 => FaultCode::PayoutTimeout,
            25 => FaultCode::PayoutJammed,
            26 => FaultCode::PayoutSensorFault,
            27 => FaultCode::LevelSensorError,
            28 => FaultCode::PersonalityModuleNotFitted,
            29 => FaultCode::PersonalityChecksumCorrupted,
            30 => FaultCode::RomChecksumMismatch,
            31 => FaultCode::MissingSlaveDevice,
            32 => FaultCode::InternalCommsBad,
            33 => FaultCode::SupplyVoltageOutsideOperatingLimits,
            34 => FaultCode::TemperatureOutsideOperatingLimits,
            35 => FaultCode::DceFault,
            36 => FaultCode::FaultOnBillValidatorSensor,
            37 => FaultCode::FaultOnBillTransportMotor,
            38 => FaultCode::FaultOnStacker,
            39 => FaultCode::BillJammed,
            40 => FaultCode::RamTestFail,
            41 => FaultCode::FaultOnStringSensor,
            42 => FaultCode::AcceptGateFailedOpen,
            43 => FaultCode::AcceptGateFailedClosed,
            44 => FaultCode::StackerMissing,
            45 => FaultCode::StackerFull,
            46 => FaultCode::FlashMemoryEraseFail,
            47 => FaultCode::FlashMemoryWriteFail,
            48 => FaultCode::SlaveDeviceNotResponding,
            49 => FaultCode::FaultOnOptoSensor,
            50 => FaultCode::BatteryFault,
            51 => FaultCode::DoorOpen,
            52 => FaultCode::MicroswitchFault,
            53 => FaultCode::RtcFault,
            54 => FaultCode::FirmwareError,
            55 => FaultCode::InitialisationError,
            56 => FaultCode::SupplyCurrentOutsideOperatingLimits,
            57 => FaultCode::ForcedBootloaderMode,
            255 => FaultCode::UnspecifiedFaultCode,
            other => FaultCode::Unknown(other),
        }
    }

    pub fn is_ok(self) -> bool {
        self == FaultCode::Ok
    }
}

impl std::fmt::Display for FaultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FaultCode::Ok => f.write_str("No fault"),
            FaultCode::Unknown(byte) => write!(f, "Unknown fault code {byte}"),
            other => write!(f, "{other:?}"),
        }
    }
}
