//! Module type database
//!
//! Static descriptors for the simulated CBUS module types: identity, table
//! sizes and whether the module echoes feedback for events it consumes.

/// MERG manufacturer id
pub const MANUFACTURER_MERG: u8 = 165;

/// CPU manufacturer code for Microchip parts
const CPU_MANUFACTURER_MICROCHIP: u8 = 1;

/// Interface type for CAN modules
const INTERFACE_CAN: u8 = 1;

/// Number of parameters after the count byte
pub const PARAMETER_COUNT: u8 = 20;

/// Module flag bits (parameter 8)
pub mod flags {
    /// Consumes events
    pub const CONSUMER: u8 = 0x01;
    /// Produces events
    pub const PRODUCER: u8 = 0x02;
    /// Full Layout implementation Mode (has a node number)
    pub const FLIM: u8 = 0x04;
    /// Has a bootloader
    pub const BOOTLOADING: u8 = 0x08;
    /// Consumes its own produced events
    pub const SELF_CONSUMING: u8 = 0x10;
    /// In learn mode
    pub const LEARN: u8 = 0x20;
}

/// Per-type rule deciding whether a consumed accessory event is echoed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackPolicy {
    /// Never echo
    Never,
    /// Echo for every stored event
    Always,
    /// Echo only for the first `n` stored events (the output channels)
    FirstEvents(u8),
}

impl FeedbackPolicy {
    /// Whether the stored event at `event_index` produces feedback
    pub fn allows(&self, event_index: usize) -> bool {
        match self {
            Self::Never => false,
            Self::Always => true,
            Self::FirstEvents(n) => event_index < *n as usize,
        }
    }
}

/// Static description of a module type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleType {
    /// Type name as printed on the board (e.g. "CANACC5")
    pub name: &'static str,
    /// Manufacturer id (parameter 1)
    pub manufacturer_id: u8,
    /// Module id (parameter 3)
    pub module_id: u8,
    /// Firmware major version (parameter 7)
    pub major_version: u8,
    /// Firmware minor version letter (parameter 2)
    pub minor_version: u8,
    /// Beta release number, 0 for release builds (parameter 20)
    pub beta: u8,
    /// Maximum stored events (parameter 4)
    pub max_events: u8,
    /// Event variables per event (parameter 5)
    pub event_variables: u8,
    /// Node variables (parameter 6)
    pub node_variables: u8,
    /// Capability flags (parameter 8), without FLiM or learn state
    pub flags: u8,
    /// Processor type (parameter 9)
    pub cpu_type: u8,
    /// Feedback rule
    pub feedback: FeedbackPolicy,
}

impl ModuleType {
    /// Name reported by RQMN: the type name without its "CAN" prefix
    pub fn short_name(&self) -> &'static str {
        self.name.strip_prefix("CAN").unwrap_or(self.name)
    }

    /// Initial parameter table; index 0 holds the number of entries after it
    pub fn parameters(&self) -> Vec<u8> {
        vec![
            PARAMETER_COUNT,
            self.manufacturer_id,
            self.minor_version,
            self.module_id,
            self.max_events,
            self.event_variables,
            self.node_variables,
            self.major_version,
            self.flags | flags::FLIM,
            self.cpu_type,
            INTERFACE_CAN,
            // Load address 0x0800, little-endian
            0x00,
            0x08,
            0x00,
            0x00,
            // CPU manufacturer's own device code
            0x00,
            0x00,
            0x00,
            0x00,
            CPU_MANUFACTURER_MICROCHIP,
            self.beta,
        ]
    }
}

/// Database of known module types
pub struct ModuleTypeDatabase;

impl ModuleTypeDatabase {
    /// Look up a module type by name (case-insensitive)
    pub fn by_name(name: &str) -> Option<&'static ModuleType> {
        MODULE_TYPES
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Look up a module type by manufacturer and module id
    pub fn by_module_id(manufacturer_id: u8, module_id: u8) -> Option<&'static ModuleType> {
        MODULE_TYPES
            .iter()
            .find(|t| t.manufacturer_id == manufacturer_id && t.module_id == module_id)
    }

    /// All known module types
    pub fn all() -> impl Iterator<Item = &'static ModuleType> {
        MODULE_TYPES.iter()
    }
}

// PIC processor codes (parameter 9)
const CPU_P18F2480: u8 = 1;
const CPU_P18F2580: u8 = 3;
const CPU_P18F25K80: u8 = 13;
const CPU_P18F26K80: u8 = 14;

static MODULE_TYPES: &[ModuleType] = &[
    ModuleType {
        name: "CANACC4",
        manufacturer_id: MANUFACTURER_MERG,
        module_id: 1,
        major_version: 2,
        minor_version: b'n',
        beta: 0,
        max_events: 32,
        event_variables: 2,
        node_variables: 8,
        flags: flags::CONSUMER | flags::BOOTLOADING,
        cpu_type: CPU_P18F2480,
        feedback: FeedbackPolicy::Never,
    },
    ModuleType {
        name: "CANACC5",
        manufacturer_id: MANUFACTURER_MERG,
        module_id: 2,
        major_version: 2,
        minor_version: b'v',
        beta: 0,
        max_events: 128,
        event_variables: 2,
        node_variables: 8,
        flags: flags::CONSUMER | flags::BOOTLOADING,
        cpu_type: CPU_P18F2480,
        feedback: FeedbackPolicy::Never,
    },
    ModuleType {
        name: "CANACC8",
        manufacturer_id: MANUFACTURER_MERG,
        module_id: 3,
        major_version: 2,
        minor_version: b'v',
        beta: 0,
        max_events: 128,
        event_variables: 2,
        node_variables: 8,
        flags: flags::CONSUMER | flags::BOOTLOADING,
        cpu_type: CPU_P18F2480,
        feedback: FeedbackPolicy::Never,
    },
    ModuleType {
        name: "CANACE8C",
        manufacturer_id: MANUFACTURER_MERG,
        module_id: 5,
        major_version: 2,
        minor_version: b'q',
        beta: 0,
        max_events: 32,
        event_variables: 2,
        node_variables: 0,
        flags: flags::PRODUCER | flags::BOOTLOADING,
        cpu_type: CPU_P18F2480,
        feedback: FeedbackPolicy::Never,
    },
    ModuleType {
        name: "CANLED64",
        manufacturer_id: MANUFACTURER_MERG,
        module_id: 7,
        major_version: 2,
        minor_version: b'g',
        beta: 0,
        max_events: 255,
        event_variables: 18,
        node_variables: 0,
        flags: flags::CONSUMER | flags::BOOTLOADING,
        cpu_type: CPU_P18F2580,
        feedback: FeedbackPolicy::Never,
    },
    ModuleType {
        name: "CANSERVO8C",
        manufacturer_id: MANUFACTURER_MERG,
        module_id: 19,
        major_version: 2,
        minor_version: b'u',
        beta: 0,
        max_events: 128,
        event_variables: 3,
        node_variables: 37,
        flags: flags::CONSUMER | flags::PRODUCER | flags::BOOTLOADING,
        cpu_type: CPU_P18F2580,
        feedback: FeedbackPolicy::Always,
    },
    ModuleType {
        name: "CANPAN",
        manufacturer_id: MANUFACTURER_MERG,
        module_id: 29,
        major_version: 1,
        minor_version: b'd',
        beta: 0,
        max_events: 128,
        event_variables: 11,
        node_variables: 1,
        flags: flags::CONSUMER | flags::PRODUCER | flags::BOOTLOADING,
        cpu_type: CPU_P18F25K80,
        feedback: FeedbackPolicy::FirstEvents(32),
    },
    ModuleType {
        name: "CANMIO",
        manufacturer_id: MANUFACTURER_MERG,
        module_id: 32,
        major_version: 3,
        minor_version: b'a',
        beta: 0,
        max_events: 255,
        event_variables: 20,
        node_variables: 126,
        flags: flags::CONSUMER | flags::PRODUCER | flags::BOOTLOADING,
        cpu_type: CPU_P18F26K80,
        feedback: FeedbackPolicy::Always,
    },
    ModuleType {
        name: "CANCDU",
        manufacturer_id: MANUFACTURER_MERG,
        module_id: 36,
        major_version: 2,
        minor_version: b'a',
        beta: 0,
        max_events: 32,
        event_variables: 3,
        node_variables: 10,
        flags: flags::CONSUMER | flags::BOOTLOADING,
        cpu_type: CPU_P18F25K80,
        feedback: FeedbackPolicy::Never,
    },
];
