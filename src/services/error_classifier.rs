//! 错误分类 - 业务能力层
//!
//! 把远端服务返回的错误粗分为"可重试"和"不可重试"两类

use crate::error::ErrorKind;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// 状态码只在"状态位置"匹配：消息开头，或紧跟 `status` / `HTTP` 之后
macro_rules! status_pattern {
    ($codes:literal) => {
        concat!(
            r"^\s*(http\s*|status\s*)?",
            $codes,
            r"\b|\b(status|http)\s*(code\s*)?[:=]?\s*",
            $codes,
            r"\b"
        )
    };
}

static TRANSIENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        "(?i)",
        status_pattern!("(408|429|5\\d\\d)"),
        r"|rate[ _-]?limit|too many requests|quota|timed? ?out|overloaded|temporar|unavailable|connection (reset|refused|closed)|server[ _-]error|try again",
    ))
    .expect("transient error pattern")
});

static PERMANENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        "(?i)",
        status_pattern!("4\\d\\d"),
        r"|unauthori[sz]ed|forbidden|invalid[ _-]?api[ _-]?key|authentication|permission denied|invalid[ _-]request|unsupported|malformed|content[ _-]policy|context[ _-]length",
    ))
    .expect("permanent error pattern")
});

static RATE_LIMITED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        "(?i)",
        status_pattern!("429"),
        r"|rate[ _-]?limit|too many requests",
    ))
    .expect("rate limit pattern")
});

/// 根据错误信息分类
///
/// 限流、超时、5xx 等可重试特征优先匹配，消息里其他位置出现的数字
/// 不会被当作状态码。无法识别的错误按可重试处理，重试次数由重试策略兜底。
pub fn classify_message(message: &str) -> ErrorKind {
    if TRANSIENT.is_match(message) {
        return ErrorKind::Transient;
    }
    if PERMANENT.is_match(message) {
        return ErrorKind::Permanent;
    }
    debug!("无法识别的错误，按可重试处理: {}", message);
    ErrorKind::Transient
}

/// 根据 OpenAI 兼容接口返回的 `type` / `code` 分类，识别不了时退回到消息
pub fn classify_api_error(error_type: Option<&str>, code: Option<&str>, message: &str) -> ErrorKind {
    for field in [code, error_type].into_iter().flatten() {
        match field {
            "rate_limit_exceeded" | "rate_limit_error" | "server_error" | "overloaded_error"
            | "timeout" | "service_unavailable" => return ErrorKind::Transient,
            "invalid_request_error" | "authentication_error" | "permission_error"
            | "invalid_api_key" | "model_not_found" | "context_length_exceeded"
            | "unsupported_file" => return ErrorKind::Permanent,
            _ => {}
        }
    }
    classify_message(message)
}

/// 根据 HTTP 状态码分类
pub fn classify_status(status: u16) -> ErrorKind {
    match status {
        408 | 429 => ErrorKind::Transient,
        500..=599 => ErrorKind::Transient,
        400..=499 => ErrorKind::Permanent,
        _ => ErrorKind::Transient,
    }
}

/// 错误信息是否看起来是限流
pub fn is_rate_limited(message: &str) -> bool {
    RATE_LIMITED.is_match(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_messages() {
        for msg in [
            "HTTP 429 Too Many Requests",
            "Rate limit reached for gpt-4o",
            "request timed out",
            "502 Bad Gateway",
            "The server is overloaded",
            "connection reset by peer",
        ] {
            assert_eq!(classify_message(msg), ErrorKind::Transient, "{msg}");
        }
    }

    #[test]
    fn test_permanent_messages() {
        for msg in [
            "401 Unauthorized",
            "Incorrect API key provided: invalid_api_key",
            "invalid_request_error: image format unsupported",
            "malformed base64 payload",
        ] {
            assert_eq!(classify_message(msg), ErrorKind::Permanent, "{msg}");
        }
    }

    #[test]
    fn test_numbers_outside_status_position_are_not_status_codes() {
        let quota = "Rate limit reached for gpt-4o in organization org-abc on tokens per min (TPM): \
                     Limit 30000, Used 29800, Requested 400. Please try again in 1.2s.";
        assert_eq!(classify_message(quota), ErrorKind::Transient);
        assert_eq!(
            classify_message("503 Service Unavailable: upstream node 404 overloaded"),
            ErrorKind::Transient
        );
        assert_eq!(
            classify_message("page 404 of the protocol could not be read"),
            ErrorKind::Transient
        );
        assert_eq!(classify_message("status: 415 media type"), ErrorKind::Permanent);
    }

    #[test]
    fn test_classify_api_error_fields() {
        assert_eq!(
            classify_api_error(Some("tokens"), Some("rate_limit_exceeded"), "Requested 400"),
            ErrorKind::Transient
        );
        assert_eq!(
            classify_api_error(Some("invalid_request_error"), None, "Invalid image"),
            ErrorKind::Permanent
        );
        assert_eq!(classify_api_error(None, None, "502 Bad Gateway"), ErrorKind::Transient);
    }

    #[test]
    fn test_unknown_message_defaults_to_transient() {
        assert_eq!(classify_message("something odd happened"), ErrorKind::Transient);
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(429), ErrorKind::Transient);
        assert_eq!(classify_status(503), ErrorKind::Transient);
        assert_eq!(classify_status(408), ErrorKind::Transient);
        assert_eq!(classify_status(400), ErrorKind::Permanent);
        assert_eq!(classify_status(401), ErrorKind::Permanent);
        assert_eq!(classify_status(415), ErrorKind::Permanent);
    }

    #[test]
    fn test_is_rate_limited() {
        assert!(is_rate_limited("Rate limit exceeded"));
        assert!(!is_rate_limited("bad request"));
        assert!(!is_rate_limited("Requested 4290 tokens"));
    }
}
