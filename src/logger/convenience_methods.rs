//! One logging method per severity, plus a `_labelled` variant of each.
//!
//! `logger.warn(msg)` is shorthand for `logger.log(Severity::Warn, msg, None)`
//! and `logger.warn_labelled(msg, label)` attaches a label to the record.

use crate::error::QueueSizeLimitExceededError;
use crate::level::Severity;
use crate::log_record::Payload;

use super::Logger;

macro_rules! severity_methods {
    ($($level:ident => $plain:ident, $labelled:ident;)*) => {
        impl Logger {
            $(
                #[doc = concat!("Log `message` at `", stringify!($level), "`.")]
                pub fn $plain(
                    &self,
                    message: impl Into<Payload>,
                ) -> Result<(), QueueSizeLimitExceededError> {
                    self.log(Severity::$level, message, None)
                }

                #[doc = concat!("Log `message` at `", stringify!($level), "` with a label.")]
                pub fn $labelled(
                    &self,
                    message: impl Into<Payload>,
                    label: &str,
                ) -> Result<(), QueueSizeLimitExceededError> {
                    self.log(Severity::$level, message, Some(label))
                }
            )*
        }
    };
}

severity_methods! {
    Emerg => emerg, emerg_labelled;
    Alert => alert, alert_labelled;
    Crit => crit, crit_labelled;
    Error => error, error_labelled;
    Warn => warn, warn_labelled;
    Notice => notice, notice_labelled;
    Info => info, info_labelled;
    Debug => debug, debug_labelled;
}
