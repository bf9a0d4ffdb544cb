//! Line status codes

/// Why a line was rejected
///
/// Codes match the numeric status reported to the host as `error:N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GcodeError {
    /// Word does not start with a letter
    ExpectedCommandLetter,
    /// Missing or malformed numeric value
    BadNumberFormat,
    /// `$` command not recognized
    InvalidStatement,
    /// Value word that may not be negative was negative
    NegativeValue,
    /// Feature disabled in the settings
    SettingDisabled,
    /// Command needs the machine to be idle
    IdleError,
    /// Command not allowed while an alarm is active
    SystemLocked,
    /// Soft limits need homing enabled
    SoftLimitError,
    /// Line does not fit the line buffer
    LineLengthExceeded,
    /// Jog target beyond the machine travel
    TravelExceeded,
    /// Jog line with a disallowed command
    InvalidJogCommand,
    /// Homing requested with no homing cycle configured
    HomingNoCycles,
    /// Unknown or unsupported G/M command or word
    UnsupportedCommand,
    /// Two commands from one modal group
    ModalGroupViolation,
    /// Feed motion without a feed rate
    UndefinedFeedRate,
    /// Command value must be an integer
    CommandValueNotInteger,
    /// Two commands that both use the axis words
    AxisCommandConflict,
    /// Same value word given twice
    WordRepeated,
    /// Command needs axis words
    NoAxisWords,
    /// Line number out of range
    InvalidLineNumber,
    /// Required value word missing
    ValueWordMissing,
    /// Coordinate system index out of range
    UnsupportedCoordSys,
    /// G53 used outside G0/G1
    G53InvalidMotionMode,
    /// Axis words given with G80
    AxisWordsExist,
    /// Arc without an axis word in the selected plane
    NoAxisWordsInPlane,
    /// Arc or probe target is invalid
    InvalidTarget,
    /// Radius too small for the arc endpoints
    ArcRadiusError,
    /// Center-format arc without an offset in the plane
    NoOffsetsInPlane,
    /// Value words left that no command used
    UnusedWords,
    /// G43.1 without exactly the tool length axis
    G43DynamicAxisError,
    /// Value above its maximum
    MaxValueExceeded,
    /// User I/O index does not exist
    PParamMaxExceeded,
    /// Jog cancelled before it was planned
    JogCancelled,
}

impl GcodeError {
    /// Numeric status code
    pub fn code(self) -> u8 {
        match self {
            GcodeError::ExpectedCommandLetter => 1,
            GcodeError::BadNumberFormat => 2,
            GcodeError::InvalidStatement => 3,
            GcodeError::NegativeValue => 4,
            GcodeError::SettingDisabled => 5,
            GcodeError::IdleError => 8,
            GcodeError::SystemLocked => 9,
            GcodeError::SoftLimitError => 10,
            GcodeError::LineLengthExceeded => 14,
            GcodeError::TravelExceeded => 15,
            GcodeError::InvalidJogCommand => 16,
            GcodeError::HomingNoCycles => 18,
            GcodeError::UnsupportedCommand => 20,
            GcodeError::ModalGroupViolation => 21,
            GcodeError::UndefinedFeedRate => 22,
            GcodeError::CommandValueNotInteger => 23,
            GcodeError::AxisCommandConflict => 24,
            GcodeError::WordRepeated => 25,
            GcodeError::NoAxisWords => 26,
            GcodeError::InvalidLineNumber => 27,
            GcodeError::ValueWordMissing => 28,
            GcodeError::UnsupportedCoordSys => 29,
            GcodeError::G53InvalidMotionMode => 30,
            GcodeError::AxisWordsExist => 31,
            GcodeError::NoAxisWordsInPlane => 32,
            GcodeError::InvalidTarget => 33,
            GcodeError::ArcRadiusError => 34,
            GcodeError::NoOffsetsInPlane => 35,
            GcodeError::UnusedWords => 36,
            GcodeError::G43DynamicAxisError => 37,
            GcodeError::MaxValueExceeded => 38,
            GcodeError::PParamMaxExceeded => 39,
            GcodeError::JogCancelled => 130,
        }
    }
}
