// 上传相关API处理器

use super::ApiResponse;
use crate::server::error::{ApiError, ApiResult};
use crate::server::AppState;
use crate::storage::Disk;
use crate::uploader::{DownloadFile, UploadRequest, UploadResponse, UploadedFile};
use axum::{
    body::Body,
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

/// 删除结果
#[derive(Debug, Serialize)]
pub struct DeletedFile {
    pub filename: String,
}

/// 上传入口
///
/// ANY /api/v1/upload
///
/// POST 为 multipart 表单，其余方法读取查询参数，由驱动决定是否支持
pub async fn upload(
    State(state): State<AppState>,
    method: Method,
    Query(query): Query<HashMap<String, String>>,
    request: Request,
) -> ApiResult<Response> {
    debug!("API: 上传请求 method={}", method);

    let mut upload_request = UploadRequest::new(method.clone());
    upload_request.fields = query;

    if method == Method::POST {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        read_multipart(multipart, &mut upload_request).await?;
    }

    let response = state.upload_handler.handle(upload_request).await?;
    match response {
        UploadResponse::Progress(progress) => Ok(Json(ApiResponse::success(progress)).into_response()),
        UploadResponse::Download(download) => {
            download_response(download, state.upload_handler.disk()).await
        }
        UploadResponse::Deleted { filename } => {
            Ok(Json(ApiResponse::success(DeletedFile { filename })).into_response())
        }
    }
}

/// 读取 multipart 表单：带文件名的字段视为文件，其余为普通字段
///
/// 文件内容读取失败时记录为损坏的文件，交给驱动返回上传错误
async fn read_multipart(mut multipart: Multipart, request: &mut UploadRequest) -> ApiResult<()> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        match field.file_name().map(str::to_string) {
            Some(file_name) => match field.bytes().await {
                Ok(data) => {
                    request.files.insert(name, UploadedFile::new(file_name, data));
                }
                Err(e) => {
                    request
                        .files
                        .insert(name, UploadedFile::failed(file_name, e.body_text()));
                    // 流已中断，后续字段无法再读取
                    break;
                }
            },
            None => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(e.body_text()))?;
                request.fields.insert(name, value);
            }
        }
    }
    Ok(())
}

/// 下载合并后的文件
///
/// GET /api/v1/files/:name
pub async fn download_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    info!("API: 下载文件 {}", name);
    let download = state.upload_handler.download(&name).await?;
    download_response(download, state.upload_handler.disk()).await
}

/// 构建附件响应：本地磁盘流式发送，其他后端一次读出
async fn download_response(download: DownloadFile, disk: &Arc<dyn Disk>) -> ApiResult<Response> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", download.filename))
            .map_err(|_| ApiError::internal("响应头构建失败"))?,
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(download.size));

    let body = match &download.absolute_path {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .map_err(|e| ApiError::internal(e.to_string()))?;
            Body::from_stream(ReaderStream::new(file))
        }
        None => {
            let data = disk
                .read(&download.path)
                .await
                .map_err(crate::uploader::UploadError::from)?;
            Body::from(data)
        }
    };

    info!("发送文件: {} ({} bytes)", download.path, download.size);
    Ok((StatusCode::OK, headers, body).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::server::build_router;
    use crate::storage::{DiskManager, MemoryDisk};
    use axum::body::to_bytes;
    use tower::ServiceExt;

    const BOUNDARY: &str = "X-CHUNK-UPLOADER-BOUNDARY";

    fn test_state() -> AppState {
        let mut disks = DiskManager::new();
        disks.insert("local", Arc::new(MemoryDisk::new()));
        AppState::with_disks(AppConfig::default(), disks).unwrap()
    }

    fn multipart_request(fields: &[(&str, String)], file: Option<(&str, &[u8])>) -> Request {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }
        if let Some((filename, data)) = file {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                    BOUNDARY, filename
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri("/api/v1/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn dz_fields(index: u64) -> Vec<(&'static str, String)> {
        vec![
            ("dzuuid", "http-1".to_string()),
            ("dzchunkindex", index.to_string()),
            ("dztotalchunkcount", "2".to_string()),
            ("dzchunksize", "5".to_string()),
            ("dztotalfilesize", "8".to_string()),
            ("dzchunkbyteoffset", (index * 5).to_string()),
        ]
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_chunked_upload_and_download() {
        let state = test_state();
        let mut events = state.subscribe();
        let app = build_router(state);

        let response = app
            .clone()
            .oneshot(multipart_request(&dz_fields(1), Some(("song.mp3", b"fgh"))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["code"], 0);
        assert_eq!(body["data"]["percentage"], 50);
        assert_eq!(body["data"]["finished"], false);

        let response = app
            .clone()
            .oneshot(multipart_request(&dz_fields(0), Some(("song.mp3", b"abcde"))))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["data"]["percentage"], 100);
        assert_eq!(body["data"]["merged_file"], "http-1.mp3");

        let event = events.recv().await.unwrap();
        assert_eq!(event.path, "merged/http-1.mp3");
        assert_eq!(event.size, 8);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/files/http-1.mp3")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
            "attachment; filename=\"http-1.mp3\""
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"abcdefgh");
    }

    #[tokio::test]
    async fn test_get_upload_is_method_not_allowed() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/upload")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get(header::ALLOW).unwrap(), "POST");
        let body = json_body(response).await;
        assert_eq!(body["code"], 405);
        assert!(body["message"].as_str().unwrap().contains("POST"));
    }

    #[tokio::test]
    async fn test_missing_field_and_missing_file() {
        let app = build_router(test_state());

        let mut fields = dz_fields(0);
        fields.retain(|(name, _)| *name != "dzuuid");
        let response = app
            .clone()
            .oneshot(multipart_request(&fields, Some(("a.txt", b"abcde"))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["message"].as_str().unwrap().contains("dzuuid"));

        let response = app
            .oneshot(multipart_request(&dz_fields(0), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_download_unknown_file() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/files/unknown.bin")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["code"], 404);
    }

    #[tokio::test]
    async fn test_health() {
        let app = build_router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }
}
