use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::ledger::TradingSession;

/// What the deep-analysis pass concluded for one instrument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Buy,
    Sell,
    Hold,
    #[serde(rename = "none", alias = "no_signal")]
    NoSignal,
}

impl AnalysisOutcome {
    pub fn is_actionable(self) -> bool {
        matches!(self, AnalysisOutcome::Buy | AnalysisOutcome::Sell)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisOutcome::Buy => "buy",
            AnalysisOutcome::Sell => "sell",
            AnalysisOutcome::Hold => "hold",
            AnalysisOutcome::NoSignal => "none",
        }
    }
}

/// The full signal-generation pass, run out of schedule on escalation.
///
/// An actionable outcome means the collaborator has written a signal record
/// for the instrument in `session`.
#[async_trait]
pub trait DeepAnalysis: Send + Sync {
    async fn analyze(
        &self,
        symbol: &str,
        session: &TradingSession,
    ) -> anyhow::Result<AnalysisOutcome>;
}

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    symbol: &'a str,
    session_id: String,
    session_date: String,
}

#[derive(Deserialize)]
struct AnalyzeResponse {
    action: AnalysisOutcome,
}

/// `POST {base_url}/analyze` against the analysis service.
#[derive(Clone)]
pub struct HttpDeepAnalysis {
    http: Client,
    base_url: String,
}

impl HttpDeepAnalysis {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("tripwire/0.1")
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl DeepAnalysis for HttpDeepAnalysis {
    #[instrument(skip(self, session), fields(session_id = %session.session_id), level = "debug")]
    async fn analyze(
        &self,
        symbol: &str,
        session: &TradingSession,
    ) -> anyhow::Result<AnalysisOutcome> {
        let url = format!("{}/analyze", self.base_url);
        let body = AnalyzeRequest {
            symbol,
            session_id: session.session_id.to_string(),
            session_date: session.session_date.to_string(),
        };

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("analysis request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("analysis service returned {status}: {text}");
        }

        let parsed: AnalyzeResponse = resp
            .json()
            .await
            .context("unreadable analysis response")?;

        debug!(action = parsed.action.as_str(), "analysis finished");
        Ok(parsed.action)
    }
}
