// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::fmt;

/// 处理器返回给总线的结算指令
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Ok,
    Retry,
    Dlq,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::Retry => "retry",
            Outcome::Dlq => "dlq",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 失败分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Validation,
    PolicyFilter,
    TransientFetch,
    PermanentFetch,
    DuplicateContent,
    AdmissionContention,
    Exception,
    Infrastructure,
}

/// 结算原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeReason {
    Processed,
    DepthExceeded { depth: u32, max_depth: u32 },
    RobotsDisallowed,
    UnsupportedContent(String),
    AlreadyInflight,
    DuplicateContent,
    AdmissionContention,
    TransientFetch(String),
    PermanentFetch(String),
    Exception(String),
    Validation(String),
    Infrastructure(String),
}

impl OutcomeReason {
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            OutcomeReason::Processed => None,
            OutcomeReason::DepthExceeded { .. }
            | OutcomeReason::RobotsDisallowed
            | OutcomeReason::UnsupportedContent(_) => Some(FailureKind::PolicyFilter),
            OutcomeReason::DuplicateContent => Some(FailureKind::DuplicateContent),
            OutcomeReason::AdmissionContention | OutcomeReason::AlreadyInflight => {
                Some(FailureKind::AdmissionContention)
            }
            OutcomeReason::TransientFetch(_) => Some(FailureKind::TransientFetch),
            OutcomeReason::PermanentFetch(_) => Some(FailureKind::PermanentFetch),
            OutcomeReason::Exception(_) => Some(FailureKind::Exception),
            OutcomeReason::Validation(_) => Some(FailureKind::Validation),
            OutcomeReason::Infrastructure(_) => Some(FailureKind::Infrastructure),
        }
    }

    /// 指标标签
    pub fn label(&self) -> &'static str {
        match self {
            OutcomeReason::Processed => "processed",
            OutcomeReason::DepthExceeded { .. } => "depth_exceeded",
            OutcomeReason::RobotsDisallowed => "robots_disallowed",
            OutcomeReason::UnsupportedContent(_) => "unsupported_content",
            OutcomeReason::AlreadyInflight => "already_inflight",
            OutcomeReason::DuplicateContent => "duplicate_content",
            OutcomeReason::AdmissionContention => "admission_contention",
            OutcomeReason::TransientFetch(_) => "transient_fetch",
            OutcomeReason::PermanentFetch(_) => "permanent_fetch",
            OutcomeReason::Exception(_) => "exception",
            OutcomeReason::Validation(_) => "validation",
            OutcomeReason::Infrastructure(_) => "infrastructure",
        }
    }
}

impl fmt::Display for OutcomeReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OutcomeReason::DepthExceeded { depth, max_depth } => {
                write!(f, "depth {} exceeds max depth {}", depth, max_depth)
            }
            OutcomeReason::UnsupportedContent(detail)
            | OutcomeReason::TransientFetch(detail)
            | OutcomeReason::PermanentFetch(detail)
            | OutcomeReason::Exception(detail)
            | OutcomeReason::Validation(detail)
            | OutcomeReason::Infrastructure(detail) => write!(f, "{}: {}", self.label(), detail),
            other => f.write_str(other.label()),
        }
    }
}

/// 处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerOutcome {
    pub outcome: Outcome,
    pub reason: OutcomeReason,
}

impl HandlerOutcome {
    pub fn ok(reason: OutcomeReason) -> Self {
        Self {
            outcome: Outcome::Ok,
            reason,
        }
    }

    pub fn processed() -> Self {
        Self::ok(OutcomeReason::Processed)
    }

    pub fn retry(reason: OutcomeReason) -> Self {
        Self {
            outcome: Outcome::Retry,
            reason,
        }
    }

    pub fn dlq(reason: OutcomeReason) -> Self {
        Self {
            outcome: Outcome::Dlq,
            reason,
        }
    }

    /// 准入竞争和在途冲突导致的重试不消耗重试预算，只累加 `deferrals`
    pub fn counts_against_budget(&self) -> bool {
        !matches!(
            self.reason,
            OutcomeReason::AdmissionContention | OutcomeReason::AlreadyInflight
        )
    }
}
