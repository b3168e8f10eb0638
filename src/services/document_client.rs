//! 共有ドキュメントストアクライアント
//!
//! 汎用的なJSONドキュメントストア（作成・取得・置換）と通信する薄いクライアント。
//! 認証は静的なBearerトークンのみで、リトライは行わない
use crate::models::Trip;
use crate::shared::config::DocumentStoreConfig;
use crate::shared::errors::{AppError, AppResult};
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use url::Url;

/// ドキュメントストアの操作
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// 旅行データ全体を新しいドキュメントとして作成し、採番されたIDを返す
    async fn create(&self, trip: &Trip) -> AppResult<String>;

    /// IDでドキュメントを取得する（存在しない場合はNotFound）
    async fn fetch(&self, document_id: &str) -> AppResult<Trip>;

    /// ドキュメントを旅行データ全体で無条件に置き換える
    async fn replace(&self, document_id: &str, trip: &Trip) -> AppResult<()>;
}

/// 作成時のレスポンス
#[derive(Debug, Deserialize)]
struct CreateDocumentResponse {
    id: String,
}

/// HTTPによるドキュメントストア実装
pub struct HttpDocumentStore {
    client: Client,
    base_url: Url,
    api_token: String,
}

impl HttpDocumentStore {
    /// 設定を指定してクライアントを作成
    pub fn new(config: &DocumentStoreConfig) -> AppResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| AppError::configuration(format!("HTTPクライアント初期化失敗: {e}")))?;

        let base_url = Url::parse(config.base_url.trim_end_matches('/')).map_err(|e| {
            AppError::configuration(format!("ドキュメントストアのURLが不正です: {e}"))
        })?;

        Ok(Self {
            client,
            base_url,
            api_token: config.api_token.clone(),
        })
    }

    /// ドキュメントのURL（IDは1つのパスセグメントとしてエンコードする）
    fn document_url(&self, document_id: &str) -> AppResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                AppError::configuration(format!(
                    "ドキュメントストアのURLにパスを追加できません: {}",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .push(document_id);
        Ok(url)
    }

    /// 2xx以外のレスポンスをエラーに変換する
    async fn check_status(response: Response, operation: &str) -> AppResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "レスポンス読み取り失敗".to_string());
        warn!("ドキュメントストアがエラーを返しました: operation={operation}, status={status}, body={body}");

        if status == StatusCode::NOT_FOUND {
            return Err(AppError::not_found("共有ドキュメント"));
        }

        Err(AppError::external_service(
            "DocumentStore".to_string(),
            format!("{operation} 失敗: HTTP {}", status.as_u16()),
        ))
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn create(&self, trip: &Trip) -> AppResult<String> {
        info!("POSTリクエスト送信: url={}", self.base_url);

        let response = self
            .client
            .post(self.base_url.clone())
            .bearer_auth(&self.api_token)
            .json(trip)
            .send()
            .await?;
        let response = Self::check_status(response, "create").await?;

        let created: CreateDocumentResponse = response.json().await.map_err(|e| {
            AppError::external_service("DocumentStore".to_string(), format!("レスポンス解析エラー: {e}"))
        })?;

        info!("共有ドキュメントを作成しました: id={}", created.id);
        Ok(created.id)
    }

    async fn fetch(&self, document_id: &str) -> AppResult<Trip> {
        let url = self.document_url(document_id)?;
        debug!("GETリクエスト送信: url={url}");

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_token)
            .send()
            .await?;
        let response = Self::check_status(response, "fetch").await?;

        response.json::<Trip>().await.map_err(|e| {
            AppError::external_service("DocumentStore".to_string(), format!("レスポンス解析エラー: {e}"))
        })
    }

    async fn replace(&self, document_id: &str, trip: &Trip) -> AppResult<()> {
        let url = self.document_url(document_id)?;
        debug!("PUTリクエスト送信: url={url}");

        let response = self
            .client
            .put(url)
            .bearer_auth(&self.api_token)
            .json(trip)
            .send()
            .await?;
        Self::check_status(response, "replace").await?;

        debug!("共有ドキュメントを置き換えました: id={document_id}");
        Ok(())
    }
}
