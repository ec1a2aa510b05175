//! Atom interning workload.
//!
//! Models a display server's atom registry: names are interned to small
//! integers, and atoms can be looked back up by number. It is the canonical
//! round-trip-bound workload, since each intern needs a reply.

use crate::adapters::simulated::Responder;
use crate::domain::{RemoteError, RequestKind};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Remote error code for an out-of-range or malformed value.
pub const BAD_VALUE: u8 = 2;
/// Remote error code for an atom that does not exist.
pub const BAD_ATOM: u8 = 5;

/// First atom number handed out for interned names. Lower numbers are
/// reserved for predefined atoms.
pub const FIRST_DYNAMIC_ATOM: u32 = 69;

/// An interned name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Atom(pub u32);

impl Atom {
    /// Returned by an `only_if_exists` intern of an unknown name.
    pub const NONE: Atom = Atom(0);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "atom:{}", self.0)
    }
}

/// Requests understood by [`AtomTable`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AtomRequest {
    /// Intern `name`. With `only_if_exists`, unknown names yield `Atom::NONE`
    /// instead of being created.
    Intern { name: String, only_if_exists: bool },
    /// Look up the name of an atom.
    GetName(Atom),
}

impl AtomRequest {
    pub fn intern(name: impl Into<String>) -> Self {
        Self::Intern {
            name: name.into(),
            only_if_exists: false,
        }
    }

    pub fn lookup(name: impl Into<String>) -> Self {
        Self::Intern {
            name: name.into(),
            only_if_exists: true,
        }
    }
}

impl RequestKind for AtomRequest {
    fn kind(&self) -> &'static str {
        match self {
            Self::Intern { .. } => "InternAtom",
            Self::GetName(_) => "GetAtomName",
        }
    }
}

/// Replies produced by [`AtomTable`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AtomReply {
    Atom(Atom),
    Name(String),
}

impl AtomReply {
    pub fn atom(&self) -> Option<Atom> {
        match self {
            Self::Atom(atom) => Some(*atom),
            Self::Name(_) => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name),
            Self::Atom(_) => None,
        }
    }
}

#[derive(Default)]
struct Registry {
    by_name: HashMap<String, Atom>,
    names: HashMap<Atom, String>,
}

/// In-memory atom registry.
pub struct AtomTable {
    registry: Mutex<Registry>,
}

impl AtomTable {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Number of interned names.
    pub fn len(&self) -> usize {
        self.registry.lock().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn intern(&self, name: String, only_if_exists: bool) -> Result<Atom, RemoteError> {
        if name.is_empty() {
            return Err(RemoteError::with_detail(
                BAD_VALUE,
                "BadValue",
                "atom name must not be empty",
            ));
        }

        let mut registry = self.registry.lock();
        if let Some(atom) = registry.by_name.get(&name) {
            return Ok(*atom);
        }
        if only_if_exists {
            return Ok(Atom::NONE);
        }

        let atom = Atom(FIRST_DYNAMIC_ATOM + registry.by_name.len() as u32);
        registry.names.insert(atom, name.clone());
        registry.by_name.insert(name, atom);
        Ok(atom)
    }

    fn name_of(&self, atom: Atom) -> Result<String, RemoteError> {
        self.registry
            .lock()
            .names
            .get(&atom)
            .cloned()
            .ok_or_else(|| RemoteError::with_detail(BAD_ATOM, "BadAtom", atom.to_string()))
    }
}

impl Default for AtomTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Responder for AtomTable {
    type Request = AtomRequest;
    type Reply = AtomReply;

    fn respond(&self, request: AtomRequest) -> Result<AtomReply, RemoteError> {
        match request {
            AtomRequest::Intern {
                name,
                only_if_exists,
            } => self.intern(name, only_if_exists).map(AtomReply::Atom),
            AtomRequest::GetName(atom) => self.name_of(atom).map(AtomReply::Name),
        }
    }
}

/// `NAME0`, `NAME1`, ... `NAME{count-1}`.
pub fn numbered_names(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("NAME{}", i)).collect()
}
