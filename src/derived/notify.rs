//! Pass-through aggregator that sends a notification when its input changes.
//!
//! ```text
//! args: [1, input, recipient, subject, body]
//!       [1, input, recipient, sender, subject, body]
//! ```
//!
//! `\n` and `\r` escapes in the body become real line breaks. Subject and
//! body may use `$V` (new value), `$N` (owning point name) and `$T`
//! (timestamp, RFC 3339).

use crate::derived::AggregateContext;
use crate::error::{EngineError, Result};
use crate::notify::{send_logged, Notification, Notifier};
use crate::point::Point;
use crate::types::{PointValue, Value};
use std::sync::Arc;

pub struct NotifyOnChange {
    recipient: String,
    sender: Option<String>,
    subject: String,
    body: String,
    last: Value,
    notifier: Arc<dyn Notifier>,
}

impl NotifyOnChange {
    pub fn from_args(parent: &Point, args: &[String], notifier: Arc<dyn Notifier>) -> Result<Self> {
        let (recipient, sender, subject, body) = match args {
            [recipient, subject, body] => (recipient, None, subject, body),
            [recipient, sender, subject, body] => (recipient, Some(sender.clone()), subject, body),
            _ => {
                return Err(EngineError::Config(format!(
                    "({}) NotifyOnChange requires recipient, [sender], subject and body",
                    parent.name()
                )))
            }
        };
        Ok(Self {
            recipient: recipient.clone(),
            sender: sender.filter(|s| !s.is_empty()),
            subject: subject.clone(),
            body: expand_escapes(body),
            last: Value::Absent,
            notifier,
        })
    }

    pub fn name(&self) -> &str {
        "NotifyOnChange"
    }

    pub fn calculate(&mut self, ctx: &AggregateContext, inputs: &[PointValue]) -> Result<Value> {
        let Some(input) = inputs.first() else {
            return Ok(Value::Absent);
        };
        let value = input.value.clone();

        if changed(&self.last, &value) {
            let message = Notification {
                recipient: self.recipient.clone(),
                sender: self.sender.clone(),
                subject: substitute(&self.subject, ctx, &value),
                body: substitute(&self.body, ctx, &value),
            };
            tracing::debug!("({}) value changed to {}, notifying {}", ctx.owner.name(), value, self.recipient);
            send_logged(self.notifier.as_ref(), &message);
        }
        self.last = value.clone();
        Ok(value)
    }
}

/// Absent on either side never counts as a change.
fn changed(last: &Value, new: &Value) -> bool {
    if last.is_absent() || new.is_absent() {
        return false;
    }
    !last.same_as(new)
}

fn expand_escapes(template: &str) -> String {
    template.replace("\\n", "\n").replace("\\r", "\r")
}

fn substitute(template: &str, ctx: &AggregateContext, value: &Value) -> String {
    template
        .replace("$V", &value.to_string())
        .replace("$N", ctx.owner.name())
        .replace("$T", &ctx.timestamp.to_rfc3339())
}
