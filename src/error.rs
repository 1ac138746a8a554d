use thiserror::Error;

/// cloclifyで発生するエラー。
///
/// `main`ではどのエラーも同じように1行で表示し、終了コード1で終了する。
#[derive(Debug, Error)]
pub enum Error {
    /// 入力や設定の誤り。メッセージはそのまま表示する。
    #[error("{0}")]
    Usage(String),

    /// APIが成功以外のステータスを返した。
    #[error("API {method} to {path} failed with {status}: {body}")]
    Api {
        method: String,
        path: String,
        status: u16,
        body: String,
    },

    /// レスポンスを受け取る前の通信エラー。
    #[error("Connection error: {0}")]
    Connection(String),

    /// レスポンスの内容を解釈できなかった。
    #[error("Invalid response from {path}: {message}")]
    InvalidResponse { path: String, message: String },
}

impl Error {
    /// `Error::Usage`を作成する。
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }
}
