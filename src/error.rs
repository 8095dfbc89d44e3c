use crate::element::ElementIdentifier;

/// Reasons a mapper blueprint can fail to build.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("Circular dependency while building mapper: {0}")]
    CircularDependency(String),

    #[error("Mapper {blueprint} names unknown template {template}")]
    UnknownTemplate { blueprint: String, template: String },

    #[error("Mapper {0} has configuration errors and cannot be built")]
    Poisoned(String),

    #[error("Mapper name already in use: {0}")]
    DuplicateName(String),

    #[error("No mapper blueprint named {0}")]
    UnknownBlueprint(String),

    #[error("Mapper blueprint {0} was already built")]
    AlreadyBuilt(String),

    #[error("Failed to build {failed} of {attempted} mapper blueprints")]
    Incomplete { failed: usize, attempted: usize },

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
}

/// Errors in the textual element mapper and actuator grammar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Unknown controller element slot: {0}")]
    UnknownSlot(String),

    #[error("Unknown force feedback actuator: {0}")]
    UnknownActuator(String),

    #[error("Unknown mapper type: {0}")]
    UnknownMapperType(String),

    #[error("Invalid parameter for {mapper}: {param}")]
    InvalidParameter { mapper: String, param: String },

    #[error("Wrong number of parameters for {mapper}: expected {expected}, got {got}")]
    ParameterCount {
        mapper: String,
        expected: &'static str,
        got: usize,
    },

    #[error("Syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },
}

/// Errors raised while validating an application data format declaration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("Packet size {0} is outside 1..={max} or not a multiple of 4", max = crate::data_format::MAX_PACKET_SIZE)]
    InvalidPacketSize(usize),

    #[error("Field at offset {offset} is not 4-byte aligned")]
    Misaligned { offset: usize },

    #[error("Field at offset {offset} with size {size} exceeds packet size {packet_size}")]
    OutOfRange {
        offset: usize,
        size: usize,
        packet_size: usize,
    },

    #[error("Field at offset {0} overlaps another field")]
    OffsetCollision(usize),

    #[error("Element {0:?} appears more than once in the format")]
    DuplicateElement(ElementIdentifier),

    #[error("Format requires an element the controller does not expose (offset {offset})")]
    UnsupportedElement { offset: usize },

    #[error("Destination buffer holds {actual} bytes but the packet needs {required}")]
    BufferTooSmall { required: usize, actual: usize },
}

/// Rejected property or buffer settings on a virtual controller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PropertyError {
    #[error("Deadzone {0} is outside 0..=10000")]
    Deadzone(u32),

    #[error("Saturation {0} is outside 0..=10000")]
    Saturation(u32),

    #[error("Axis range [{min}, {max}] is empty")]
    Range { min: i32, max: i32 },

    #[error("Force feedback gain {0} is outside 0..=10000")]
    ForceFeedbackGain(u32),

    #[error("Event buffer capacity {0} exceeds the maximum")]
    EventBufferCapacity(usize),
}

#[derive(Debug, thiserror::Error)]
pub enum PadBridgeError {
    #[error("Mapper error: {0}")]
    Build(#[from] BuildError),

    #[error("Data format error: {0}")]
    Format(#[from] FormatError),

    #[error("Property error: {0}")]
    Property(#[from] PropertyError),

    #[error("Unknown mapper: {0}")]
    UnknownMapper(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Platform not supported: {0}")]
    PlatformNotSupported(String),

    #[error("Physical controller error: {0}")]
    Physical(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PadBridgeError>;
