//! Interactive shell: parses one line per command and renders the result.

use std::fmt::Write as _;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use valuta_common::{time, Currency, RateEntry, Timestamp};
use valuta_fx::RateQuote;
use valuta_ledger::{TradeRecord, Valuation};

use crate::error::{HubError, HubResult};
use crate::service::{RatesView, RefreshReport, TradingHub};
use crate::state::Session;

/// One shell line. The first word is the command.
#[derive(Debug, Parser)]
#[command(multicall = true)]
pub struct ReplLine {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Command {
    /// Register a new account and log in
    Register { username: String, password: String },

    /// Log in to an existing account
    Login { username: String, password: String },

    /// Log out
    Logout,

    /// Buy a currency with USD
    #[command(allow_negative_numbers = true)]
    Buy { currency: String, amount: Decimal },

    /// Sell a currency for USD
    #[command(allow_negative_numbers = true)]
    Sell { currency: String, amount: Decimal },

    /// Show the rate between two currencies
    GetRate {
        from: String,
        #[arg(default_value = "USD")]
        to: String,
    },

    /// Fetch the latest rates
    UpdateRates {
        /// Only query this source (coingecko or exchangerate-api)
        #[arg(long)]
        source: Option<String>,
    },

    /// Show stored rates
    ShowRates {
        /// Only rates involving this currency
        #[arg(long)]
        currency: Option<String>,
    },

    /// Show your balances and their value
    ShowPortfolio {
        /// Valuation currency
        #[arg(long)]
        base: Option<String>,
    },

    /// List supported currencies
    ListCurrencies {
        /// fiat or crypto
        #[arg(long)]
        kind: Option<String>,
    },

    /// Show past rates of a pair, most recent first
    RateHistory {
        from: String,
        #[arg(default_value = "USD")]
        to: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Leave the shell
    #[command(alias = "quit")]
    Exit,
}

/// Result of one shell line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Output(String),
    Exit,
}

/// Shell state: the hub and the current session, if any.
pub struct Repl {
    hub: Arc<TradingHub>,
    session: Option<Session>,
}

impl Repl {
    pub fn new(hub: Arc<TradingHub>) -> Self {
        Self { hub, session: None }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn prompt(&self) -> String {
        match &self.session {
            Some(session) => format!("[{}] valuta> ", session.username),
            None => "valuta> ".to_string(),
        }
    }

    /// Parse and run one line.
    pub async fn execute(&mut self, line: &str) -> Outcome {
        let line = line.trim();
        if line.is_empty() {
            return Outcome::Output(String::new());
        }

        let parsed = match ReplLine::try_parse_from(line.split_whitespace()) {
            Ok(parsed) => parsed,
            Err(e) => return Outcome::Output(e.render().to_string().trim_end().to_string()),
        };

        match self.run(parsed.command).await {
            Ok(outcome) => outcome,
            Err(e) => Outcome::Output(format!("error: {e}")),
        }
    }

    async fn run(&mut self, command: Command) -> HubResult<Outcome> {
        let output = match command {
            Command::Exit => return Ok(Outcome::Exit),

            Command::Register { username, password } => {
                let session = self.hub.register(&username, &password).await?;
                let text = format!(
                    "User '{}' registered with {} USD. Logged in as {}.",
                    session.username,
                    self.hub.initial_balance(),
                    session.username
                );
                self.session = Some(session);
                text
            }

            Command::Login { username, password } => {
                let session = self.hub.login(&username, &password).await?;
                let text = format!("Logged in as {}.", session.username);
                self.session = Some(session);
                text
            }

            Command::Logout => {
                let session = self.session.take().ok_or(HubError::NotLoggedIn)?;
                let text = format!("Logged out {}.", session.username);
                self.hub.logout(session);
                text
            }

            Command::Buy { currency, amount } => {
                let session = self.require_session()?;
                render_trade(&self.hub.buy(session, &currency, amount).await?)
            }

            Command::Sell { currency, amount } => {
                let session = self.require_session()?;
                render_trade(&self.hub.sell(session, &currency, amount).await?)
            }

            Command::GetRate { from, to } => render_quote(&self.hub.get_rate(&from, &to).await?),

            Command::UpdateRates { source } => {
                render_refresh(&self.hub.update_rates(source.as_deref()).await?)
            }

            Command::ShowRates { currency } => {
                render_rates(&self.hub.show_rates(currency.as_deref()).await?)
            }

            Command::ListCurrencies { kind } => self
                .hub
                .list_currencies(kind.as_deref())?
                .iter()
                .map(Currency::display_info)
                .collect::<Vec<_>>()
                .join("\n"),

            Command::RateHistory { from, to, limit } => {
                render_history(&self.hub.rate_history(&from, &to, limit).await?)
            }

            Command::ShowPortfolio { base } => {
                let session = self.require_session()?;
                let valuation = self.hub.show_portfolio(session, base.as_deref()).await?;
                render_portfolio(&session.username, &valuation)
            }
        };

        Ok(Outcome::Output(output))
    }

    fn require_session(&self) -> HubResult<&Session> {
        self.session.as_ref().ok_or(HubError::NotLoggedIn)
    }
}

fn render_trade(trade: &TradeRecord) -> String {
    format!(
        "{}\nBalances: {} {}, {} USD",
        trade,
        trade.currency_balance.normalize(),
        trade.currency,
        trade.usd_balance.normalize()
    )
}

fn render_quote(quote: &RateQuote) -> String {
    let entry = &quote.entry;
    let mut out = format!(
        "1 {} = {} {} (updated {}, source {})",
        entry.base,
        entry.rate,
        entry.quote,
        format_time(entry.updated_at),
        entry.source
    );
    if let Some(inverse) = entry.inverted() {
        let _ = write!(out, "\n1 {} = {} {}", inverse.base, inverse.rate.round_dp(8), inverse.quote);
    }
    if !quote.fresh {
        let _ = write!(
            out,
            "\nwarning: rate is {} s old; run update-rates",
            quote.age_seconds(time::now())
        );
    }
    out
}

fn render_refresh(report: &RefreshReport) -> String {
    let mut out = format!(
        "Updated {} pairs from {}.",
        report.updated_pairs,
        report.succeeded.join(", ")
    );
    for (source, error) in &report.failed {
        let _ = write!(out, "\nwarning: {source} failed: {error}");
    }
    if let Some(at) = report.last_refresh {
        let _ = write!(out, "\nLast refresh: {}", format_time(at));
    }
    out
}

fn render_rates(view: &RatesView) -> String {
    if view.rows.is_empty() {
        return "No rates available. Run 'update-rates' first.".to_string();
    }

    let mut out = match view.last_refresh {
        Some(at) => format!("Rates (last refresh {}):", format_time(at)),
        None => "Rates:".to_string(),
    };
    for row in &view.rows {
        let entry = &row.entry;
        let _ = write!(
            out,
            "\n  {:<10} {:>20} {:<18} {}{}",
            entry.pair().to_string(),
            entry.rate.to_string(),
            entry.source,
            format_time(entry.updated_at),
            if row.fresh { "" } else { " (stale)" }
        );
    }
    out
}

fn render_history(entries: &[RateEntry]) -> String {
    if entries.is_empty() {
        return "No history for this pair.".to_string();
    }
    entries
        .iter()
        .map(|entry| {
            format!(
                "  {}  {} {}  ({})",
                format_time(entry.updated_at),
                entry.pair(),
                entry.rate,
                entry.source
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_portfolio(username: &str, valuation: &Valuation) -> String {
    if valuation.holdings.is_empty() {
        return format!("Portfolio of {username} is empty.");
    }

    let mut out = format!("Portfolio of {} (base {}):", username, valuation.base);
    for (code, holding) in &valuation.holdings {
        let value = match holding.value {
            Some(value) => round_money(value).to_string(),
            None => "n/a (no rate)".to_string(),
        };
        let _ = write!(
            out,
            "\n  {:<6} {:>20} {:>20}",
            code.to_string(),
            holding.balance.to_string(),
            value
        );
    }
    let _ = write!(
        out,
        "\nTotal: {} {}",
        round_money(valuation.total),
        valuation.base
    );
    out
}

fn round_money(value: Decimal) -> Decimal {
    value.round_dp(2).normalize()
}

fn format_time(at: Timestamp) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}
