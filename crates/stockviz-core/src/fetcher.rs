//! Historical price fetching.
//!
//! [`TimeSeriesFetcher`] is the seam the pipeline depends on;
//! [`GoogleFinanceFetcher`] is the production implementation that speaks the
//! `getprices` text endpoint through an injected [`HttpClient`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

use crate::http_client::{
    HttpClient, HttpError, HttpErrorKind, HttpRequest, ReqwestHttpClient, DEFAULT_TIMEOUT_MS,
};
use crate::wire;
use crate::{InstrumentRef, Period, TimeSeries};

pub const DEFAULT_BASE_URL: &str = "http://www.google.com/finance/getprices";

/// Fixed output-format flags: requested columns and compact date encoding.
const FORMAT_FIELDS: &str = "d,o,h,l,c,v";
const DATE_FORMAT: &str = "cpct";

/// Failure to obtain a series for one instrument and period.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The endpoint could not be reached or did not answer usefully.
    #[error("network error fetching {instrument} ({period}): {message}")]
    Network {
        instrument: InstrumentRef,
        period: Period,
        message: String,
    },

    /// The endpoint answered but no data rows could be parsed.
    #[error("no price data for {instrument} ({period})")]
    EmptySeries {
        instrument: InstrumentRef,
        period: Period,
    },

    #[error("could not assemble series for {instrument} ({period}): {message}")]
    Malformed {
        instrument: InstrumentRef,
        period: Period,
        message: String,
    },
}

impl FetchError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Network { .. } => "fetch.network",
            Self::EmptySeries { .. } => "fetch.empty_series",
            Self::Malformed { .. } => "fetch.malformed",
        }
    }

    pub fn instrument(&self) -> &InstrumentRef {
        match self {
            Self::Network { instrument, .. }
            | Self::EmptySeries { instrument, .. }
            | Self::Malformed { instrument, .. } => instrument,
        }
    }

    pub fn period(&self) -> &Period {
        match self {
            Self::Network { period, .. }
            | Self::EmptySeries { period, .. }
            | Self::Malformed { period, .. } => period,
        }
    }
}

/// Source of historical series for the comparison pipeline.
pub trait TimeSeriesFetcher: Send + Sync {
    fn fetch<'a>(
        &'a self,
        instrument: &'a InstrumentRef,
        interval_secs: u32,
        period: &'a Period,
    ) -> Pin<Box<dyn Future<Output = Result<TimeSeries, FetchError>> + Send + 'a>>;
}

/// Endpoint settings for [`GoogleFinanceFetcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetcherConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            base_url: String::from(DEFAULT_BASE_URL),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// Fetcher for the `getprices` anchor/offset text endpoint.
#[derive(Clone)]
pub struct GoogleFinanceFetcher {
    http_client: Arc<dyn HttpClient>,
    config: FetcherConfig,
}

impl Default for GoogleFinanceFetcher {
    fn default() -> Self {
        Self::new(Arc::new(ReqwestHttpClient::new()), FetcherConfig::default())
    }
}

impl GoogleFinanceFetcher {
    pub fn new(http_client: Arc<dyn HttpClient>, config: FetcherConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Build the request URL for one series.
    pub fn request_url(
        &self,
        instrument: &InstrumentRef,
        interval_secs: u32,
        period: &Period,
    ) -> String {
        format!(
            "{}?q={}&x={}&i={}&p={}&f={}&df={}",
            self.config.base_url,
            urlencoding::encode(instrument.code()),
            urlencoding::encode(instrument.venue()),
            interval_secs,
            urlencoding::encode(period.as_str()),
            FORMAT_FIELDS,
            DATE_FORMAT,
        )
    }

    fn describe_transport_error(&self, error: &HttpError) -> String {
        match error.kind() {
            HttpErrorKind::Timeout => format!(
                "timed out after {} ms: {}",
                self.config.timeout_ms,
                error.message()
            ),
            HttpErrorKind::Connect => format!("could not connect: {}", error.message()),
            HttpErrorKind::Body | HttpErrorKind::Other => error.message().to_owned(),
        }
    }

    async fn fetch_series(
        &self,
        instrument: &InstrumentRef,
        interval_secs: u32,
        period: &Period,
    ) -> Result<TimeSeries, FetchError> {
        let url = self.request_url(instrument, interval_secs, period);
        log::debug!("fetching {instrument} ({period}) from {url}");

        let request = HttpRequest::get(url)
            .with_header("Accept", "text/plain")
            .with_timeout_ms(self.config.timeout_ms);
        let network = |message: String| FetchError::Network {
            instrument: instrument.clone(),
            period: period.clone(),
            message,
        };

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|error| network(self.describe_transport_error(&error)))?;

        if !response.is_success() {
            return Err(network(format!(
                "upstream returned status {}",
                response.status
            )));
        }

        let parsed = wire::parse_body(&response.body, interval_secs);
        log::debug!(
            "parsed {} points for {instrument} ({period}), skipped {} rows, {} anomalies",
            parsed.points.len(),
            parsed.skipped.len(),
            parsed.anomalies.len()
        );

        if parsed.points.is_empty() {
            return Err(FetchError::EmptySeries {
                instrument: instrument.clone(),
                period: period.clone(),
            });
        }

        TimeSeries::new(
            instrument.clone(),
            period.clone(),
            interval_secs,
            parsed.points,
        )
        .map_err(|error| FetchError::Malformed {
            instrument: instrument.clone(),
            period: period.clone(),
            message: error.to_string(),
        })
    }
}

impl TimeSeriesFetcher for GoogleFinanceFetcher {
    fn fetch<'a>(
        &'a self,
        instrument: &'a InstrumentRef,
        interval_secs: u32,
        period: &'a Period,
    ) -> Pin<Box<dyn Future<Output = Result<TimeSeries, FetchError>> + Send + 'a>> {
        Box::pin(self.fetch_series(instrument, interval_secs, period))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::{HttpError, HttpResponse};
    use std::sync::Mutex;

    #[derive(Debug)]
    struct RecordingHttpClient {
        response: Result<HttpResponse, HttpError>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl RecordingHttpClient {
        fn new(response: Result<HttpResponse, HttpError>) -> Self {
            Self {
                response,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn recorded_requests(&self) -> Vec<HttpRequest> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .clone()
        }
    }

    impl HttpClient for RecordingHttpClient {
        fn execute<'a>(
            &'a self,
            request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .push(request);
            let response = self.response.clone();
            Box::pin(async move { response })
        }
    }

    fn aapl() -> InstrumentRef {
        InstrumentRef::new("AAPL", "NASDAQ").expect("instrument")
    }

    fn one_month() -> Period {
        Period::parse("1M").expect("period")
    }

    const BODY: &str = "EXCHANGE%3DNASDAQ\nMARKET_OPEN_MINUTE=570\nMARKET_CLOSE_MINUTE=960\n\
INTERVAL=86400\nCOLUMNS=DATE,CLOSE,HIGH,LOW,OPEN,VOLUME\nDATA=\nTIMEZONE_OFFSET=-300\n\
a1609459200,100,105,95,101,1000\n0,100,105,95,101,1000\n1,102,106,96,100,1100\n";

    #[test]
    fn builds_request_url_with_format_flags() {
        let fetcher = GoogleFinanceFetcher::new(
            Arc::new(RecordingHttpClient::new(Ok(HttpResponse::ok_text("")))),
            FetcherConfig {
                base_url: String::from("https://prices.test/getprices"),
                timeout_ms: 500,
            },
        );
        let instrument = InstrumentRef::new("BRK B", "NYSE").expect("instrument");

        assert_eq!(
            fetcher.request_url(&instrument, 86_400, &one_month()),
            "https://prices.test/getprices?q=BRK%20B&x=NYSE&i=86400&p=1M&f=d,o,h,l,c,v&df=cpct"
        );
    }

    #[tokio::test]
    async fn fetch_parses_body_into_series() {
        let client = Arc::new(RecordingHttpClient::new(Ok(HttpResponse::ok_text(BODY))));
        let fetcher = GoogleFinanceFetcher::new(client.clone(), FetcherConfig::default());

        let series = fetcher
            .fetch(&aapl(), 86_400, &one_month())
            .await
            .expect("fetch should succeed");

        assert_eq!(series.len(), 2);
        assert_eq!(series.instrument(), &aapl());
        assert_eq!(series.period(), &one_month());
        assert_eq!(series.points()[1].timestamp.unix_timestamp(), 1_609_545_600);

        let requests = client.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(
            requests[0].headers.get("accept").map(String::as_str),
            Some("text/plain")
        );
    }

    #[tokio::test]
    async fn transport_failure_is_network_error() {
        let client = Arc::new(RecordingHttpClient::new(Err(HttpError::connect(
            "connection refused",
        ))));
        let fetcher = GoogleFinanceFetcher::new(client, FetcherConfig::default());

        let error = fetcher
            .fetch(&aapl(), 86_400, &one_month())
            .await
            .expect_err("fetch should fail");

        assert!(matches!(error, FetchError::Network { .. }));
        assert_eq!(error.code(), "fetch.network");
        assert!(error.to_string().contains("could not connect: connection refused"));
    }

    #[tokio::test]
    async fn timeout_is_reported_with_its_budget() {
        let client = Arc::new(RecordingHttpClient::new(Err(HttpError::timeout(
            "deadline elapsed",
        ))));
        let fetcher = GoogleFinanceFetcher::new(
            client,
            FetcherConfig {
                timeout_ms: 500,
                ..FetcherConfig::default()
            },
        );

        let error = fetcher
            .fetch(&aapl(), 86_400, &one_month())
            .await
            .expect_err("fetch should fail");

        assert!(matches!(error, FetchError::Network { .. }));
        assert!(error.to_string().contains("timed out after 500 ms"));
        assert!(!error.to_string().contains("could not connect"));
    }

    #[tokio::test]
    async fn error_status_is_network_error() {
        let client = Arc::new(RecordingHttpClient::new(Ok(HttpResponse {
            status: 503,
            body: String::from("unavailable"),
        })));
        let fetcher = GoogleFinanceFetcher::new(client, FetcherConfig::default());

        let error = fetcher
            .fetch(&aapl(), 86_400, &one_month())
            .await
            .expect_err("fetch should fail");

        assert!(matches!(error, FetchError::Network { ref message, .. } if message.contains("503")));
    }

    #[tokio::test]
    async fn preamble_only_body_is_empty_series() {
        let preamble_only = BODY.lines().take(7).collect::<Vec<_>>().join("\n");
        let client = Arc::new(RecordingHttpClient::new(Ok(HttpResponse::ok_text(preamble_only))));
        let fetcher = GoogleFinanceFetcher::new(client, FetcherConfig::default());

        let error = fetcher
            .fetch(&aapl(), 86_400, &one_month())
            .await
            .expect_err("fetch should fail");

        assert_eq!(
            error,
            FetchError::EmptySeries {
                instrument: aapl(),
                period: one_month(),
            }
        );
    }
}
