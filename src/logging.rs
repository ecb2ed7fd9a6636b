//! Structured logging macros shared by the API, the services and the store.
//!
//! Every event carries `operation`; the optional identifiers are
//! `question_id` and `reminder_id`. Counts go in `count`, timings in
//! `duration_ms`.

// HTTP handlers

#[macro_export]
macro_rules! log_api_start {
    ($operation:expr, question_id = $question_id:expr) => {
        tracing::debug!(operation = $operation, question_id = %$question_id, "API operation started");
    };
    ($operation:expr, reminder_id = $reminder_id:expr) => {
        tracing::debug!(operation = $operation, reminder_id = %$reminder_id, "API operation started");
    };
    ($operation:expr) => {
        tracing::debug!(operation = $operation, "API operation started");
    };
}

#[macro_export]
macro_rules! log_api_success {
    ($operation:expr, question_id = $question_id:expr, $msg:expr) => {
        tracing::info!(operation = $operation, question_id = %$question_id, "API operation completed: {}", $msg);
    };
    ($operation:expr, reminder_id = $reminder_id:expr, $msg:expr) => {
        tracing::info!(operation = $operation, reminder_id = %$reminder_id, "API operation completed: {}", $msg);
    };
    ($operation:expr, count = $count:expr, $msg:expr) => {
        tracing::info!(operation = $operation, count = $count, "API operation completed: {}", $msg);
    };
}

#[macro_export]
macro_rules! log_api_error {
    ($operation:expr, question_id = $question_id:expr, error = $error:expr, $msg:expr) => {
        tracing::error!(
            operation = $operation,
            question_id = %$question_id,
            error = %$error,
            "API operation failed: {}", $msg
        );
    };
    ($operation:expr, error = $error:expr, $msg:expr) => {
        tracing::error!(operation = $operation, error = %$error, "API operation failed: {}", $msg);
    };
}

/// Expected misses such as an unknown question id
#[macro_export]
macro_rules! log_api_warn {
    ($operation:expr, question_id = $question_id:expr, $msg:expr) => {
        tracing::warn!(operation = $operation, question_id = %$question_id, "API operation warning: {}", $msg);
    };
}

// Services

#[macro_export]
macro_rules! log_service_success {
    ($service:expr, $operation:expr, count = $count:expr, duration_ms = $duration:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            count = $count,
            duration_ms = $duration,
            "Service operation completed"
        );
    };
    ($service:expr, $operation:expr, $msg:expr) => {
        tracing::info!(service = $service, operation = $operation, "Service operation completed: {}", $msg);
    };
}

#[macro_export]
macro_rules! log_service_error {
    ($service:expr, $operation:expr, error = $error:expr) => {
        tracing::error!(service = $service, operation = $operation, error = %$error, "Service operation failed");
    };
}

#[macro_export]
macro_rules! log_service_warn {
    ($service:expr, $operation:expr, $msg:expr) => {
        tracing::warn!(service = $service, operation = $operation, "Service warning: {}", $msg);
    };
}

// Store

#[macro_export]
macro_rules! log_db_operation {
    (debug, $operation:expr, count = $count:expr, duration_ms = $duration:expr) => {
        tracing::debug!(
            component = "database",
            operation = $operation,
            result_count = $count,
            duration_ms = $duration,
            "Database operation completed"
        );
    };
    (info, $operation:expr, $msg:expr) => {
        tracing::info!(component = "database", operation = $operation, "Database operation: {}", $msg);
    };
}

// Process lifecycle and input checks

#[macro_export]
macro_rules! log_system_event {
    (startup, component = $component:expr, $msg:expr) => {
        tracing::info!(event_type = "startup", component = $component, "System event: {}", $msg);
    };
    (shutdown, component = $component:expr, $msg:expr) => {
        tracing::info!(event_type = "shutdown", component = $component, "System event: {}", $msg);
    };
    (config, $msg:expr) => {
        tracing::info!(event_type = "configuration", "System event: {}", $msg);
    };
}

#[macro_export]
macro_rules! log_validation {
    (success, $component:expr, $msg:expr) => {
        tracing::debug!(
            event_type = "validation",
            component = $component,
            result = "success",
            "Validation completed: {}", $msg
        );
    };
    (failure, $component:expr, error = $error:expr) => {
        tracing::warn!(
            event_type = "validation",
            component = $component,
            result = "failure",
            error = %$error,
            "Validation failed"
        );
    };
}
