//! The alert engine (spec §4.7): per-symbol rule evaluation against
//! `(price, indicators)` updates and concurrent, independently-failing
//! dispatch to notification channels.

#![warn(rustc::all)]

pub mod channels;
pub mod engine;
pub mod rule_store;

pub use channels::{
    LoggingEmailSender, NotificationSender, SlackSender, WebhookSender, WsSender, DISPATCH_TIMEOUT,
};
pub use engine::AlertEngine;
pub use rule_store::{AlertRuleStore, InMemoryAlertRuleStore, NoopRuleCache, RuleCache};
