use async_trait::async_trait;
use chrono::Utc;
use compass_core::{
    CompassError, FinancialStatements, MarketDataGateway, PricePoint, QuoteSnapshot, Statement,
};
use reqwest::{Client, StatusCode};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

mod payload;

pub use payload::{humanize_type, parse_chart, parse_quote_summary, parse_timeseries};

const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const TIMESERIES_URL: &str = "https://query2.finance.yahoo.com/ws/fundamentals-timeseries/v1/finance/timeseries";
const QUOTE_SUMMARY_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";
const QUOTE_SUMMARY_MODULES: &str = "price,summaryDetail,defaultKeyStatistics,financialData";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko)";

/// Earliest period Yahoo serves annual timeseries for.
const TIMESERIES_PERIOD_START: i64 = 493_590_046;

pub const INCOME_STATEMENT_TYPES: &[&str] = &[
    "TotalRevenue",
    "OperatingRevenue",
    "OperatingIncome",
    "EBIT",
    "EBITDA",
    "InterestExpense",
    "NetIncome",
];

pub const BALANCE_SHEET_TYPES: &[&str] = &[
    "TotalDebt",
    "CashAndCashEquivalents",
    "CurrentAssets",
    "CurrentLiabilities",
    "WorkingCapital",
    "TotalAssets",
    "TotalLiabilitiesNetMinorityInterest",
    "RetainedEarnings",
];

pub const CASH_FLOW_TYPES: &[&str] = &[
    "OperatingCashFlow",
    "CapitalExpenditure",
    "FreeCashFlow",
];

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            // Wait until the oldest request falls out of the window
            let sleep_dur = match ts.front() {
                Some(&oldest) => (oldest + self.window).duration_since(now) + Duration::from_millis(50),
                None => Duration::from_millis(50),
            };
            drop(ts);
            tracing::debug!("Rate limiter: waiting {:.1}s for Yahoo slot", sleep_dur.as_secs_f64());
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

/// Market data gateway backed by Yahoo Finance's public JSON endpoints.
#[derive(Clone)]
pub struct YahooClient {
    client: Client,
    rate_limiter: RateLimiter,
    crumb: Option<String>,
}

impl YahooClient {
    /// `rate_limit` is requests per minute. `crumb` is forwarded to the
    /// quote summary endpoint when Yahoo requires one.
    pub fn new(rate_limit: usize, crumb: Option<String>) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            rate_limiter: RateLimiter::new(rate_limit, Duration::from_secs(60)),
            crumb,
        }
    }

    /// Send a request with rate limiting and automatic 429 retry.
    async fn send_request(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, CompassError> {
        let request = builder
            .build()
            .map_err(|e| CompassError::ApiError(e.to_string()))?;

        for attempt in 0..3u32 {
            self.rate_limiter.acquire().await;
            let req_clone = request
                .try_clone()
                .ok_or_else(|| CompassError::ApiError("Cannot clone request".to_string()))?;
            let response = self
                .client
                .execute(req_clone)
                .await
                .map_err(|e| CompassError::GatewayUnavailable(e.to_string()))?;

            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                return Ok(response);
            }

            let wait_secs = 15u64;
            tracing::warn!("Yahoo 429 rate limited, waiting {}s before retry {}/3", wait_secs, attempt + 1);
            tokio::time::sleep(Duration::from_secs(wait_secs)).await;
        }

        Err(CompassError::GatewayUnavailable(
            "Rate limited by Yahoo after 3 retries".to_string(),
        ))
    }

    /// GET `url` and return the body text, mapping HTTP failures onto the error taxonomy.
    async fn get_text(&self, symbol: &str, builder: reqwest::RequestBuilder) -> Result<String, CompassError> {
        let response = self.send_request(builder).await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(CompassError::NoData(symbol.to_string()));
        }
        if !status.is_success() {
            return Err(CompassError::ApiError(format!(
                "HTTP {}: {}",
                status,
                response.text().await.unwrap_or_default()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| CompassError::GatewayUnavailable(e.to_string()))
    }

    /// Daily bars for the last `days` sessions
    pub async fn get_chart(&self, symbol: &str, days: u32) -> Result<Vec<PricePoint>, CompassError> {
        let url = format!("{}/{}", CHART_URL, symbol);
        let range = format!("{}d", days.max(1));
        let body = self
            .get_text(
                symbol,
                self.client.get(&url).query(&[("range", range.as_str()), ("interval", "1d")]),
            )
            .await?;

        let points = parse_chart(&body)?;
        tracing::debug!("Fetched {} price points for {}", points.len(), symbol);
        Ok(points)
    }

    /// Annual statement rows for the given timeseries types.
    pub async fn get_timeseries(
        &self,
        symbol: &str,
        types: &[&str],
    ) -> Result<Statement, CompassError> {
        let url = format!("{}/{}", TIMESERIES_URL, symbol);
        let type_param = types
            .iter()
            .map(|t| format!("annual{}", t))
            .collect::<Vec<_>>()
            .join(",");
        let period2 = Utc::now().timestamp().to_string();
        let period1 = TIMESERIES_PERIOD_START.to_string();

        let body = self
            .get_text(
                symbol,
                self.client.get(&url).query(&[
                    ("symbol", symbol),
                    ("type", type_param.as_str()),
                    ("period1", period1.as_str()),
                    ("period2", period2.as_str()),
                ]),
            )
            .await?;

        parse_timeseries(&body, types)
    }

    /// Quote/info snapshot
    pub async fn get_quote_summary(&self, symbol: &str) -> Result<QuoteSnapshot, CompassError> {
        let url = format!("{}/{}", QUOTE_SUMMARY_URL, symbol);
        let mut query = vec![("modules", QUOTE_SUMMARY_MODULES.to_string())];
        if let Some(ref crumb) = self.crumb {
            query.push(("crumb", crumb.clone()));
        }

        let body = self
            .get_text(symbol, self.client.get(&url).query(&query))
            .await?;

        parse_quote_summary(&body, symbol)
    }
}

/// Combine the three statement fetches. A failed statement is logged and left
/// empty; only an all-empty result is an error.
fn merge_statements(
    symbol: &str,
    income_statement: Result<Statement, CompassError>,
    balance_sheet: Result<Statement, CompassError>,
    cash_flow: Result<Statement, CompassError>,
) -> Result<FinancialStatements, CompassError> {
    let mut failures = Vec::new();
    let mut take = |name: &str, result: Result<Statement, CompassError>| {
        result.unwrap_or_else(|e| {
            tracing::warn!("Failed to fetch {} for {}: {:?}", name, symbol, e);
            failures.push(format!("{}: {}", name, e));
            Statement::default()
        })
    };

    let statements = FinancialStatements {
        income_statement: take("income statement", income_statement),
        balance_sheet: take("balance sheet", balance_sheet),
        cash_flow: take("cash flow", cash_flow),
    };

    if statements.income_statement.is_empty()
        && statements.balance_sheet.is_empty()
        && statements.cash_flow.is_empty()
    {
        return Err(match failures.len() {
            0 => CompassError::NoData(symbol.to_string()),
            _ => CompassError::GatewayUnavailable(format!("{}: {}", symbol, failures.join("; "))),
        });
    }
    Ok(statements)
}

#[async_trait]
impl MarketDataGateway for YahooClient {
    async fn price_history(&self, symbol: &str, days: u32) -> Result<Vec<PricePoint>, CompassError> {
        self.get_chart(symbol, days).await
    }

    async fn statements(&self, symbol: &str) -> Result<FinancialStatements, CompassError> {
        let income_statement = self.get_timeseries(symbol, INCOME_STATEMENT_TYPES).await;
        let balance_sheet = self.get_timeseries(symbol, BALANCE_SHEET_TYPES).await;
        let cash_flow = self.get_timeseries(symbol, CASH_FLOW_TYPES).await;

        merge_statements(symbol, income_statement, balance_sheet, cash_flow)
    }

    async fn quote(&self, symbol: &str) -> Result<QuoteSnapshot, CompassError> {
        self.get_quote_summary(symbol).await
    }
}
