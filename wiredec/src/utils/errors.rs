#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err);
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Required channel '{0}' is not assigned")]
    ChannelMissing(&'static str),

    #[error("Channel index {index} exceeds capture width of {width} channels")]
    ChannelOutOfRange { index: usize, width: usize },

    #[error("Capture carries no samplerate, but the decoder needs one")]
    SamplerateMissing,

    #[error("Option '{option}' has invalid value '{value}'")]
    InvalidOption { option: String, value: String },

    #[error("Unknown option '{0}'")]
    UnknownOption(String),
}

#[derive(thiserror::Error, Debug)]
pub enum UartError {
    #[error("Frame error: start bit must be low, read high")]
    InvalidStartBit,

    #[error("Frame error: stop bit must be high, read low")]
    InvalidStopBit,

    #[error("Parity error: expected {expected}, read {received}")]
    ParityMismatch { expected: u8, received: u8 },

    #[error("Capture ended inside a frame after {0} data bits")]
    TruncatedFrame(usize),
}

#[derive(thiserror::Error, Debug)]
pub enum CanError {
    #[error("Bitrate sync lost: edge at sample {0} is not on a bit boundary")]
    SyncLost(u64),

    #[error("CRC mismatch: calculated {calculated:#06X}, read {read:#06X}")]
    CrcMismatch { calculated: u16, read: u16 },

    #[error("Stuff error: six consecutive identical bits inside stuffed region")]
    StuffError,

    #[error("CRC delimiter must be recessive")]
    InvalidCrcDelimiter,

    #[error("ACK delimiter must be recessive")]
    InvalidAckDelimiter,

    #[error("End of frame must be seven recessive bits")]
    InvalidEndOfFrame,

    #[error("FD frames are not supported, skipping frame at sample {0}")]
    FdFrameUnsupported(u64),

    #[error("Capture ended inside a frame after {0} bits")]
    TruncatedFrame(usize),
}

#[derive(thiserror::Error, Debug)]
pub enum SdError {
    #[error("CRC-7 mismatch on {kind} token: calculated {calculated:#04X}, read {read:#04X}")]
    CrcMismatch {
        kind: &'static str,
        calculated: u8,
        read: u8,
    },

    #[error("Token end bit must be 1")]
    InvalidEndBit,

    #[error("Unknown command CMD{0}, decoding response as R1")]
    UnknownCommand(u8),

    #[error("Capture ended inside a token after {got} of {expected} bits")]
    TruncatedToken { got: usize, expected: usize },
}

#[derive(thiserror::Error, Debug)]
pub enum ModbusError {
    #[error("CRC mismatch: calculated {calculated:#06X}, read {read:#06X}")]
    CrcMismatch { calculated: u16, read: u16 },

    #[error("Message too short: {got} bytes, needs at least {minimum}")]
    TooShort { got: usize, minimum: usize },

    #[error("Message continues past its expected end")]
    TooLong,

    #[error("Unknown function code {0}")]
    UnknownFunction(u8),
}
