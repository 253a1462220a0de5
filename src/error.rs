//! 错误目录：按失败阶段分段的稳定数字错误码
//!
//! 1xx 线程 / 2xx 助手 / 3xx 运行流 / 4xx 向量库。所有组件的失败路径统一通过
//! lookup 构造 ErrorRecord，调用方按数字码分支；传输层的原始错误文本只进入
//! detail，不替代目录条目。

use thiserror::Error;

/// 目录条目：码 + 消息模板 + 详情模板（`{}` 为运行时上下文占位符）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub code: u16,
    pub message: &'static str,
    pub detail: &'static str,
}

/// 静态错误目录，进程启动后只读
const CATALOG: &[CatalogEntry] = &[
    // 1xx：线程生命周期
    CatalogEntry {
        code: 100,
        message: "Thread alias already exists",
        detail: "Alias or thread id '{}' is already mapped in this directory",
    },
    CatalogEntry {
        code: 101,
        message: "Failed to create thread",
        detail: "Thread creation request failed: {}",
    },
    CatalogEntry {
        code: 102,
        message: "Failed to retrieve thread",
        detail: "Thread retrieval request failed: {}",
    },
    CatalogEntry {
        code: 103,
        message: "Unknown thread alias",
        detail: "No thread is mapped to alias '{}'",
    },
    CatalogEntry {
        code: 104,
        message: "Failed to create message",
        detail: "Message creation request failed: {}",
    },
    // 2xx：助手生命周期
    CatalogEntry {
        code: 200,
        message: "Failed to update assistant name",
        detail: "Name update request failed: {}",
    },
    CatalogEntry {
        code: 201,
        message: "Failed to update assistant instructions",
        detail: "Instruction update request failed: {}",
    },
    CatalogEntry {
        code: 202,
        message: "Invalid or rejected model parameters",
        detail: "Model or sampling parameters refused: {}",
    },
    CatalogEntry {
        code: 203,
        message: "Failed to delete assistant",
        detail: "Assistant deletion request failed: {}",
    },
    CatalogEntry {
        code: 204,
        message: "Failed to create assistant",
        detail: "Assistant creation request failed: {}",
    },
    CatalogEntry {
        code: 205,
        message: "Failed to retrieve assistant",
        detail: "Assistant retrieval request failed: {}",
    },
    CatalogEntry {
        code: 206,
        message: "Failed to update tool set",
        detail: "Tool set rejected: {}",
    },
    CatalogEntry {
        code: 207,
        message: "File attachment aborted",
        detail: "{}",
    },
    CatalogEntry {
        code: 208,
        message: "Assistant handle is detached",
        detail: "Operation '{}' requires an active assistant id",
    },
    // 3xx：运行 / 流
    CatalogEntry {
        code: 301,
        message: "Failed to open run stream",
        detail: "Run creation request failed: {}",
    },
    CatalogEntry {
        code: 302,
        message: "Run ended in failure state '{}'",
        detail: "Observed terminal run status: {}",
    },
    CatalogEntry {
        code: 303,
        message: "Run stream transport failure",
        detail: "{}",
    },
    // 4xx：向量库生命周期
    CatalogEntry {
        code: 400,
        message: "Failed to retrieve vector store",
        detail: "Vector store retrieval request failed: {}",
    },
    CatalogEntry {
        code: 401,
        message: "Failed to create vector store",
        detail: "Vector store creation request failed: {}",
    },
    CatalogEntry {
        code: 402,
        message: "Failed to attach file to vector store",
        detail: "{}",
    },
    CatalogEntry {
        code: 403,
        message: "Local file is not readable",
        detail: "Cannot read file at '{}'",
    },
    CatalogEntry {
        code: 404,
        message: "Vector store is detached",
        detail: "Operation '{}' requires an active vector store id",
    },
    CatalogEntry {
        code: 405,
        message: "Vector store id does not resolve",
        detail: "No vector store found for id '{}'",
    },
    CatalogEntry {
        code: 406,
        message: "Invalid file purpose",
        detail: "Purpose '{}' is not one of assistants | fine-tune | vision | batch",
    },
    CatalogEntry {
        code: 407,
        message: "Failed to modify vector store",
        detail: "Vector store update request failed: {}",
    },
    CatalogEntry {
        code: 408,
        message: "Failed to delete vector store",
        detail: "Vector store deletion request failed: {}",
    },
];

/// 按码查目录条目
pub fn lookup(code: u16) -> Option<&'static CatalogEntry> {
    CATALOG.iter().find(|e| e.code == code)
}

/// 实例化后的错误记录：目录条目 + 插值后的运行时上下文
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("(code {code}) {message}")]
pub struct ErrorRecord {
    pub code: u16,
    pub message: String,
    pub detail: String,
}

impl ErrorRecord {
    /// 无上下文实例化（模板中的占位符原样保留）
    pub fn of(code: u16) -> Self {
        Self::fill(code, None)
    }

    /// 带上下文实例化：替换消息与详情模板中的 `{}`
    pub fn emit(code: u16, ctx: impl AsRef<str>) -> Self {
        Self::fill(code, Some(ctx.as_ref()))
    }

    fn fill(code: u16, ctx: Option<&str>) -> Self {
        let sub = |template: &str| match ctx {
            Some(c) => template.replace("{}", c),
            None => template.to_string(),
        };
        match lookup(code) {
            Some(entry) => Self {
                code,
                message: sub(entry.message),
                detail: sub(entry.detail),
            },
            // 不在目录中的码不应出现；保底给一条可识别记录而不是 panic
            None => Self {
                code,
                message: "Unrecognized error code".to_string(),
                detail: ctx.unwrap_or_default().to_string(),
            },
        }
    }

    /// 码所属的百位分段（1 线程 / 2 助手 / 3 运行流 / 4 索引）
    pub fn band(&self) -> u16 {
        self.code / 100
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_codes() {
        for code in [100, 104, 200, 208, 301, 303, 400, 408] {
            assert!(lookup(code).is_some(), "code {} missing from catalog", code);
        }
        assert!(lookup(999).is_none());
    }

    #[test]
    fn test_emit_interpolates_message_and_detail() {
        let err = ErrorRecord::emit(302, "expired");
        assert_eq!(err.code, 302);
        assert!(err.message.contains("expired"));
        assert!(err.detail.contains("expired"));
    }

    #[test]
    fn test_of_keeps_template_untouched() {
        let err = ErrorRecord::of(303);
        assert_eq!(err.message, "Run stream transport failure");
    }

    #[test]
    fn test_display_carries_code() {
        let err = ErrorRecord::emit(100, "chat");
        assert!(err.to_string().contains("(code 100)"));
    }

    #[test]
    fn test_band() {
        assert_eq!(ErrorRecord::of(104).band(), 1);
        assert_eq!(ErrorRecord::of(206).band(), 2);
        assert_eq!(ErrorRecord::of(302).band(), 3);
        assert_eq!(ErrorRecord::of(406).band(), 4);
    }

    #[test]
    fn test_unknown_code_fallback() {
        let err = ErrorRecord::emit(999, "ctx");
        assert_eq!(err.code, 999);
        assert_eq!(err.message, "Unrecognized error code");
    }
}
