// evio container sizes (in 32-bit words)
pub const BANK_HEADER_SIZE: usize = 2;
pub const SEGMENT_HEADER_SIZE: usize = 1;
pub const TAGSEGMENT_HEADER_SIZE: usize = 1;
pub const MARKER_SIZE: usize = 1;
pub const MAX_BANK_DEPTH: usize = 16;

// evio file format
pub const EVIO_MAGIC: u32 = 0xc0da0100;
pub const EVIO_BLOCK_HEADER_SIZE: usize = 8;
pub const EVIO_SUPPORTED_VERSION: u32 = 4;
pub const EVIO_VERSION_MASK: u32 = 0xFF;
pub const EVIO_LAST_BLOCK_BIT: u32 = 0x200;

// CODA event tags
pub const CODA_PRESTART: u16 = 0xffd1;
pub const CODA_GO: u16 = 0xffd2;
pub const CODA_END: u16 = 0xffd4;
pub const CODA_PHYSICS_1: u16 = 0xff50;
pub const CODA_PHYSICS_2: u16 = 0xff70;

// JLab module data-type-defining words
pub const TYPE_DEFINING_BIT: u32 = 0x8000_0000;
pub const TYPE_SHIFT: u32 = 27;
pub const TYPE_MASK: u32 = 0xF;
pub const SLOT_SHIFT: u32 = 22;
pub const SLOT_MASK: u32 = 0x1F;

// FADC250 electronics constants
pub const FADC250_CHANNELS: usize = 16;
pub const FADC250_SAMPLE_MASK: u32 = 0x1FFF;
pub const FADC250_TIME_MASK: u32 = 0xFF_FFFF;
pub const FADC250_DEFAULT_CLOCK_PERIOD: f64 = 4.0; // ns, 250 MHz
