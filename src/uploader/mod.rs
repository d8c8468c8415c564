// 上传核心模块
//
// 接收分片或整文件上传：
// - 按客户端协议解析分片字段（Dropzone / resumable.js）
// - 写入前校验分片字节区间与上传清单
// - 全部分片到达后按索引升序合并，清理分片目录
// - 每个新完成的文件只通知一次

pub mod chunk;
pub mod descriptor;
pub mod driver;
pub mod error;
pub mod handler;
pub mod identifier;
pub mod merge;
pub mod notify;
pub mod progress;
pub mod protocol;
pub mod range;
pub mod request;

pub use chunk::{ChunkStore, UploadManifest};
pub use descriptor::{sanitize_upload_id, LastChunk, UploadDescriptor};
pub use driver::{
    driver_for, ChunkedUploadDriver, DropzoneUploadDriver, MonolithUploadDriver,
    ResumableUploadDriver, UploadContext, UploadDriver,
};
pub use error::{RangeError, UploadError, UploadResult};
pub use handler::UploadHandler;
pub use identifier::{HashIdentifier, Identifier, OriginalNameIdentifier, UuidIdentifier};
pub use notify::{
    BroadcastNotifier, CompletionNotifier, FileUploaded, FnNotifier, LoggingNotifier,
    NotifierChain,
};
pub use protocol::{ChunkProtocol, DropzoneProtocol, ResumableProtocol};
pub use range::ValidatedRange;
pub use request::{
    DownloadFile, FileMetadata, MergedFile, UploadProgress, UploadRequest, UploadResponse,
    UploadedFile,
};
