//! # Structured Values
//!
//! The value model carried by channels. A `Value` is the Rust rendering of a
//! structured-clone payload: scalars, text, lists, records, plus two handle
//! kinds that are eligible for reference-transfer instead of deep copy.
//!
//! ## Invariants
//!
//! - No allocation is ever shared across a channel boundary; `seal` always
//!   produces fresh handles (moved contents for transferred handles, copied
//!   contents otherwise).
//! - A detached handle stays detached; using it again is an error, never UB.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use tokio::sync::mpsc;

use crate::error::Error;
use crate::error::Result;

/// A structured value as carried by a channel.
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    U64(u64),
    I64(i64),
    F64(f64),
    Text(String),
    List(Vec<Value>),
    Record(Vec<(String, Value)>),
    /// Byte buffer handle, eligible for reference-transfer.
    Buffer(ByteBuf),
    /// Channel endpoint handle, transferable only (never copied).
    Port(PortHandle),
}

impl Value {
    /// Builds a text value.
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Reads the value as an unsigned key. Accepts non-negative `I64` as
    /// well, since peers are free to encode counters either way.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::U64(n) => Some(*n),
            Self::I64(n) => u64::try_from(*n).ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I64(n) => Some(*n),
            Self::U64(n) => i64::try_from(*n).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::F64(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_buffer(&self) -> Option<&ByteBuf> {
        match self {
            Self::Buffer(buf) => Some(buf),
            _ => None,
        }
    }

    /// Looks up a field on a record value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        match self {
            Self::Record(fields) => {
                fields.iter().find(|(name, _)| name == field).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_list(self) -> Option<Vec<Value>> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::U64(a), Self::U64(b)) => a == b,
            (Self::I64(a), Self::I64(b)) => a == b,
            (Self::F64(a), Self::F64(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Record(a), Self::Record(b)) => a == b,
            // Buffers compare by contents, ports by identity.
            (Self::Buffer(a), Self::Buffer(b)) => a.peek() == b.peek(),
            (Self::Port(a), Self::Port(b)) => a.same_port(b),
            _ => false,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::U64(n) => write!(f, "{}", n),
            Self::I64(n) => write!(f, "{}", n),
            Self::F64(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{:?}", s),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Self::Record(fields) => {
                write!(f, "{{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}: {}", name, value)?;
                }
                write!(f, "}}")
            }
            Self::Buffer(buf) => {
                if buf.is_detached() {
                    write!(f, "<buffer detached>")
                } else {
                    write!(f, "<buffer len={}>", buf.len())
                }
            }
            Self::Port(port) => {
                if port.is_detached() {
                    write!(f, "<port detached>")
                } else {
                    write!(f, "<port>")
                }
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Self::U64(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::I64(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::F64(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<ByteBuf> for Value {
    fn from(buf: ByteBuf) -> Self {
        Self::Buffer(buf)
    }
}

/// Shared handle to a byte buffer.
///
/// Clones of a `ByteBuf` refer to the same allocation; `detach` moves the
/// contents out for a transfer, leaving every clone detached (length zero).
#[derive(Clone, Debug)]
pub struct ByteBuf {
    inner: Arc<Mutex<Option<Vec<u8>>>>,
}

impl ByteBuf {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { inner: Arc::new(Mutex::new(Some(bytes))) }
    }

    fn guard(&self) -> MutexGuard<'_, Option<Vec<u8>>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Current length in bytes; zero once detached.
    pub fn len(&self) -> usize {
        self.guard().as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once the contents were moved to a peer by a transfer.
    pub fn is_detached(&self) -> bool {
        self.guard().is_none()
    }

    /// Deep-copies the contents.
    pub fn clone_bytes(&self) -> Result<Vec<u8>> {
        self.guard().as_ref().cloned().ok_or(Error::BufferDetached)
    }

    /// Moves the contents out, leaving this handle (and all clones) detached.
    pub fn detach(&self) -> Result<Vec<u8>> {
        self.guard().take().ok_or(Error::BufferDetached)
    }

    /// True when both handles refer to the same allocation.
    pub fn same_buf(&self, other: &ByteBuf) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn peek(&self) -> Option<Vec<u8>> {
        self.guard().as_ref().cloned()
    }
}

/// One endpoint of a raw duplex message pipe.
///
/// This is the unit that port transfer moves: a send half toward the peer
/// and a receive half from it.
#[derive(Debug)]
pub struct RawPort {
    pub tx: mpsc::UnboundedSender<Value>,
    pub rx: mpsc::UnboundedReceiver<Value>,
}

impl RawPort {
    /// Creates a connected pair of endpoints.
    pub fn pair() -> (RawPort, RawPort) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();

        let a = RawPort { tx: tx_a, rx: rx_b };
        let b = RawPort { tx: tx_b, rx: rx_a };
        (a, b)
    }
}

/// Shared handle to a pipe endpoint.
///
/// Like `ByteBuf`, clones share one endpoint and `detach` neuters them all.
#[derive(Clone, Debug)]
pub struct PortHandle {
    inner: Arc<Mutex<Option<RawPort>>>,
}

impl PortHandle {
    pub fn new(port: RawPort) -> Self {
        Self { inner: Arc::new(Mutex::new(Some(port))) }
    }

    fn guard(&self) -> MutexGuard<'_, Option<RawPort>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn is_detached(&self) -> bool {
        self.guard().is_none()
    }

    /// Moves the endpoint out, leaving this handle (and all clones) detached.
    pub fn detach(&self) -> Result<RawPort> {
        self.guard().take().ok_or(Error::PortDetached)
    }

    pub fn same_port(&self, other: &PortHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Identity-keyed set of handles selected for reference-transfer.
#[derive(Clone, Default)]
pub struct TransferList {
    bufs: Vec<ByteBuf>,
    ports: Vec<PortHandle>,
}

impl TransferList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_buf(&mut self, buf: &ByteBuf) {
        if !self.contains_buf(buf) {
            self.bufs.push(buf.clone());
        }
    }

    pub fn push_port(&mut self, port: &PortHandle) {
        if !self.contains_port(port) {
            self.ports.push(port.clone());
        }
    }

    /// Adds the value's handle if it is a transferable kind. Returns whether
    /// anything was added.
    pub fn push_value(&mut self, value: &Value) -> bool {
        match value {
            Value::Buffer(buf) => {
                self.push_buf(buf);
                true
            }
            Value::Port(port) => {
                self.push_port(port);
                true
            }
            _ => false,
        }
    }

    pub fn contains_buf(&self, buf: &ByteBuf) -> bool {
        self.bufs.iter().any(|b| b.same_buf(buf))
    }

    pub fn contains_port(&self, port: &PortHandle) -> bool {
        self.ports.iter().any(|p| p.same_port(port))
    }

    pub fn len(&self) -> usize {
        self.bufs.len() + self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bufs.is_empty() && self.ports.is_empty()
    }
}

/// Produces the isolated copy of a value that crosses the channel.
///
/// Handles named in the transfer list are moved (the sender side is left
/// detached); every other handle is deep-copied into a fresh allocation.
/// Ports are never copied; sending one that is not in the transfer list is
/// an error.
pub fn seal(value: &Value, transfers: &TransferList) -> Result<Value> {
    Ok(match value {
        Value::Null => Value::Null,
        Value::Bool(b) => Value::Bool(*b),
        Value::U64(n) => Value::U64(*n),
        Value::I64(n) => Value::I64(*n),
        Value::F64(n) => Value::F64(*n),
        Value::Text(s) => Value::Text(s.clone()),
        Value::List(items) => {
            let sealed = items
                .iter()
                .map(|item| seal(item, transfers))
                .collect::<Result<Vec<_>>>()?;
            Value::List(sealed)
        }
        Value::Record(fields) => {
            let sealed = fields
                .iter()
                .map(|(name, item)| Ok((name.clone(), seal(item, transfers)?)))
                .collect::<Result<Vec<_>>>()?;
            Value::Record(sealed)
        }
        Value::Buffer(buf) => {
            let bytes = if transfers.contains_buf(buf) {
                buf.detach()?
            } else {
                buf.clone_bytes()?
            };
            Value::Buffer(ByteBuf::new(bytes))
        }
        Value::Port(port) => {
            if !transfers.contains_port(port) {
                return Err(Error::PortRequiresTransfer);
            }
            Value::Port(PortHandle::new(port.detach()?))
        }
    })
}
