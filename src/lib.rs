pub mod api;
pub mod config;
pub mod database;
pub mod errors;
pub mod events;
pub mod filter;
pub mod logging;
pub mod models;
pub mod notifications;
pub mod query;
pub mod question_service;
pub mod reconciler;
pub mod reminders;
pub mod solutions;

pub use database::Database;
pub use errors::*;
pub use events::{EventBus, StoreEvent};
pub use filter::{FilterSelection, PersistedFilter, QuestionFilter, Remark};
pub use models::*;
pub use query::{QuestionPredicate, QuestionQuery};
pub use question_service::QuestionService;
pub use reconciler::{ListReconciler, ListSync, ReconcileReport};
pub use reminders::{ReminderScheduler, ReminderService};
pub use solutions::{SolutionFetcher, SolutionService};
