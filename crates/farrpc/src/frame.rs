//! # Protocol Frames
//!
//! Defines the two message shapes of the engine (Call vs Return) and the
//! shape classification for inbound payloads.
//!
//! ## Invariants
//!
//! - Classification discriminates on required-field presence only; a payload
//!   matching neither shape is `None`, never an error. This keeps a channel
//!   shareable with unrelated traffic.
//! - Unknown fields are skipped for forward compatibility.

use crate::value::Value;

/// An outbound or inbound call: invoke `name` in `namespace` on the peer.
#[derive(Clone, Debug, PartialEq)]
pub struct CallFrame {
    pub namespace: String,
    pub name: String,
    /// Correlation key, unique among this side's outstanding calls.
    pub key: u64,
    pub args: Vec<Value>,
}

impl CallFrame {
    pub fn into_value(self) -> Value {
        Value::Record(vec![
            ("namespace".to_string(), Value::Text(self.namespace)),
            ("name".to_string(), Value::Text(self.name)),
            ("key".to_string(), Value::U64(self.key)),
            ("args".to_string(), Value::List(self.args)),
        ])
    }

    fn from_fields(fields: Vec<(String, Value)>) -> Option<Self> {
        let mut namespace = None;
        let mut name = None;
        let mut key = None;
        let mut args = None;

        for (field, value) in fields {
            match field.as_str() {
                "namespace" => namespace = value.into_text(),
                "name" => name = value.into_text(),
                "key" => key = value.as_u64(),
                "args" => args = value.into_list(),
                _ => {}
            }
        }

        Some(CallFrame {
            namespace: namespace?,
            name: name?,
            key: key?,
            args: args?,
        })
    }
}

/// The reply to a call: either the callee's result or its failure payload.
#[derive(Clone, Debug, PartialEq)]
pub struct ReturnFrame {
    pub namespace: String,
    pub name: String,
    pub key: u64,
    /// `Ok(ret)` on success, `Err(err)` with the opaque failure payload.
    pub outcome: Result<Value, Value>,
}

impl ReturnFrame {
    pub fn into_value(self) -> Value {
        let mut fields = vec![
            ("namespace".to_string(), Value::Text(self.namespace)),
            ("name".to_string(), Value::Text(self.name)),
            ("key".to_string(), Value::U64(self.key)),
        ];
        match self.outcome {
            Ok(ret) => {
                fields.push(("ok".to_string(), Value::Bool(true)));
                fields.push(("ret".to_string(), ret));
            }
            Err(err) => {
                fields.push(("ok".to_string(), Value::Bool(false)));
                fields.push(("err".to_string(), err));
            }
        }
        Value::Record(fields)
    }

    fn from_fields(fields: Vec<(String, Value)>) -> Option<Self> {
        let mut namespace = None;
        let mut name = None;
        let mut key = None;
        let mut ok = None;
        let mut ret = None;
        let mut err = None;

        for (field, value) in fields {
            match field.as_str() {
                "namespace" => namespace = value.into_text(),
                "name" => name = value.into_text(),
                "key" => key = value.as_u64(),
                "ok" => ok = value.as_bool(),
                "ret" => ret = Some(value),
                "err" => err = Some(value),
                _ => {}
            }
        }

        let outcome = if ok? {
            Ok(ret.unwrap_or(Value::Null))
        } else {
            Err(err.unwrap_or(Value::Null))
        };

        Some(ReturnFrame {
            namespace: namespace?,
            name: name?,
            key: key?,
            outcome,
        })
    }
}

/// A recognized engine message.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Call(CallFrame),
    Return(ReturnFrame),
}

impl Frame {
    pub fn into_value(self) -> Value {
        match self {
            Self::Call(call) => call.into_value(),
            Self::Return(ret) => ret.into_value(),
        }
    }

    /// Discriminates an inbound payload.
    ///
    /// A record with `namespace`/`name`/`key`/`ok` is a Return; with
    /// `namespace`/`name`/`key`/`args` it is a Call. Anything else is
    /// unrelated traffic and yields `None`.
    pub fn classify(value: Value) -> Option<Frame> {
        let Value::Record(fields) = value else {
            return None;
        };

        let mut correlated = 0;
        let mut has_ok = false;
        let mut has_args = false;
        for (name, _) in &fields {
            match name.as_str() {
                "namespace" | "name" | "key" => correlated += 1,
                "ok" => has_ok = true,
                "args" => has_args = true,
                _ => {}
            }
        }
        if correlated < 3 {
            return None;
        }

        if has_ok {
            ReturnFrame::from_fields(fields).map(Frame::Return)
        } else if has_args {
            CallFrame::from_fields(fields).map(Frame::Call)
        } else {
            None
        }
    }
}
