use serde::Serialize;
use time::{Duration, OffsetDateTime};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("window start {from} is after window end {to}")]
    Inverted {
        from: OffsetDateTime,
        to: OffsetDateTime,
    },
    #[error("window of {span} before {end} starts outside the representable range")]
    OutOfRange { end: OffsetDateTime, span: Duration },
}

/// Closed time interval `[from, to]` used for range aggregates.
///
/// Readings stamped exactly on either boundary belong to the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    #[serde(with = "time::serde::rfc3339")]
    from: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    to: OffsetDateTime,
}

impl TimeWindow {
    pub fn new(from: OffsetDateTime, to: OffsetDateTime) -> Result<Self, WindowError> {
        if from > to {
            return Err(WindowError::Inverted { from, to });
        }
        Ok(Self { from, to })
    }

    /// The `span` leading up to and including `end`.
    pub fn trailing(end: OffsetDateTime, span: Duration) -> Result<Self, WindowError> {
        let span = span.abs();
        let from = end
            .checked_sub(span)
            .ok_or(WindowError::OutOfRange { end, span })?;
        Ok(Self { from, to: end })
    }

    pub fn from(&self) -> OffsetDateTime {
        self.from
    }

    pub fn to(&self) -> OffsetDateTime {
        self.to
    }

    pub fn contains(&self, ts: OffsetDateTime) -> bool {
        self.from <= ts && ts <= self.to
    }
}
