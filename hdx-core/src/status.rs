/// Client return codes
///
/// Numeric values match the HyperDex client enum, which occupies
/// `[8448, 8576)`. Codes below 8512 are outcomes rather than failures.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u32)]
pub enum Status {
    Success = 8448,
    NotFound = 8449,
    SearchDone = 8450,
    CmpFail = 8451,
    ReadOnly = 8452,

    // Error conditions
    UnknownSpace = 8512,
    CoordFail = 8513,
    ServerError = 8514,
    PollFailed = 8515,
    Overflow = 8516,
    Reconfigure = 8517,
    Timeout = 8519,
    UnknownAttr = 8520,
    DupeAttr = 8521,
    NonePending = 8523,
    DontUseKey = 8524,
    WrongType = 8525,
    NoMem = 8526,
    Interrupted = 8530,
    ClusterJump = 8531,
    Offline = 8533,
    Unauthorized = 8534,

    // This should never happen. It indicates a bug.
    Internal = 8573,
    Exception = 8574,
    Garbage = 8575,
}

const ALL: [Status; 25] = [
    Status::Success,
    Status::NotFound,
    Status::SearchDone,
    Status::CmpFail,
    Status::ReadOnly,
    Status::UnknownSpace,
    Status::CoordFail,
    Status::ServerError,
    Status::PollFailed,
    Status::Overflow,
    Status::Reconfigure,
    Status::Timeout,
    Status::UnknownAttr,
    Status::DupeAttr,
    Status::NonePending,
    Status::DontUseKey,
    Status::WrongType,
    Status::NoMem,
    Status::Interrupted,
    Status::ClusterJump,
    Status::Offline,
    Status::Unauthorized,
    Status::Internal,
    Status::Exception,
    Status::Garbage,
];

impl Status {
    /// Numeric wire value of this status
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Look up a status by its numeric value
    pub fn from_code(code: u32) -> Option<Status> {
        ALL.iter().copied().find(|s| s.code() == code)
    }

    /// All known statuses in numeric order
    pub fn all() -> &'static [Status] {
        &ALL
    }

    /// Returns true for statuses in the error range.
    ///
    /// NOTFOUND, SEARCHDONE, CMPFAIL and READONLY are outcomes the
    /// operation encoders interpret; they are not errors by themselves.
    pub fn is_error(self) -> bool {
        self.code() >= 8512
    }

    /// Short symbolic name, e.g. `UNKNOWNATTR`
    pub fn symbol(self) -> &'static str {
        match self {
            Status::Success => "SUCCESS",
            Status::NotFound => "NOTFOUND",
            Status::SearchDone => "SEARCHDONE",
            Status::CmpFail => "CMPFAIL",
            Status::ReadOnly => "READONLY",
            Status::UnknownSpace => "UNKNOWNSPACE",
            Status::CoordFail => "COORDFAIL",
            Status::ServerError => "SERVERERROR",
            Status::PollFailed => "POLLFAILED",
            Status::Overflow => "OVERFLOW",
            Status::Reconfigure => "RECONFIGURE",
            Status::Timeout => "TIMEOUT",
            Status::UnknownAttr => "UNKNOWNATTR",
            Status::DupeAttr => "DUPEATTR",
            Status::NonePending => "NONEPENDING",
            Status::DontUseKey => "DONTUSEKEY",
            Status::WrongType => "WRONGTYPE",
            Status::NoMem => "NOMEM",
            Status::Interrupted => "INTERRUPTED",
            Status::ClusterJump => "CLUSTER_JUMP",
            Status::Offline => "OFFLINE",
            Status::Unauthorized => "UNAUTHORIZED",
            Status::Internal => "INTERNAL",
            Status::Exception => "EXCEPTION",
            Status::Garbage => "GARBAGE",
        }
    }

    /// Human-readable description without attribute context
    pub fn description(self) -> &'static str {
        match self {
            Status::Success => "Success",
            Status::NotFound => "Not found",
            Status::SearchDone => "Search done",
            Status::CmpFail => "Conditional operation did not match object",
            Status::ReadOnly => "Cluster is in a read-only state",
            Status::UnknownSpace => "Unknown space",
            Status::CoordFail => "Coordinator failure",
            Status::ServerError => "Server error",
            Status::PollFailed => "Polling failed",
            Status::Overflow => "Integer overflow or divide-by-zero",
            Status::Reconfigure => "Reconfiguration",
            Status::Timeout => "Timeout",
            Status::UnknownAttr => "Unknown attribute",
            Status::DupeAttr => "Duplicate attribute",
            Status::NonePending => "None pending",
            Status::DontUseKey => {
                "Do not specify the key in a search predicate and do not redundantly specify the key for an insert"
            }
            Status::WrongType => "Attribute has the wrong type",
            Status::NoMem => "Memory allocation failed",
            Status::Interrupted => "Interrupted",
            Status::ClusterJump => "Client connected to a different cluster",
            Status::Offline => "All servers for the key are offline",
            Status::Unauthorized => "Not authorized to perform this operation",
            Status::Internal => "Internal error (file a bug)",
            Status::Exception => "Internal exception (file a bug)",
            Status::Garbage => "Uninitialized status (file a bug)",
        }
    }

    /// Message template with a `%s` slot for the offending attribute.
    ///
    /// Statuses that never name an attribute return their plain description.
    pub fn template(self) -> &'static str {
        match self {
            Status::UnknownAttr => "Unknown attribute \"%s\"",
            Status::DupeAttr => "Attribute \"%s\" was specified more than once",
            Status::WrongType => "Attribute \"%s\" has the wrong type",
            Status::DontUseKey => "Do not use the key attribute \"%s\" in predicates or attribute lists",
            Status::Overflow => "Integer overflow or divide-by-zero on attribute \"%s\"",
            other => other.description(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
