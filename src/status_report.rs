//! Parser for the text status block the bot posts on `notify`
//!
//! The block is a whitespace-aligned table. Only the rows the bridge cares
//! about are picked out; anything missing stays `None` so the caller can
//! keep its previous values.
//!
//! ```text
//!   Assets:
//!                       BTC     USDT
//!     Total Balance     0.5     1000
//!     Available Balance 0.4      900
//!   Markets:
//!     Exchange  Market    Best Bid  Best Ask  Mid Price
//!     binance   BTC-USDT  29000     29010     29005
//! ```

use crate::types::try_parse;

/// Raw column values extracted from a status block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    pub base_asset: Option<String>,
    pub quote_asset: Option<String>,
    pub total: Option<(String, String)>,
    pub available: Option<(String, String)>,
    pub prices: Option<MarketRow>,
}

/// Bid/ask/mid columns of the markets table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketRow {
    pub bid: String,
    pub ask: String,
    pub mid: String,
}

impl StatusReport {
    /// Whether a notify message carries a status block
    pub fn is_status_block(msg: &str) -> bool {
        msg.contains("Total Balance")
            || msg
                .lines()
                .any(|line| line.split_whitespace().next() == Some("Assets:"))
    }

    pub fn parse(text: &str) -> Self {
        let lines: Vec<Vec<&str>> = text
            .lines()
            .map(|line| line.split_whitespace().collect::<Vec<_>>())
            .filter(|cols| !cols.is_empty())
            .collect();

        let mut report = StatusReport::default();

        for (i, cols) in lines.iter().enumerate() {
            let next = lines.get(i + 1);

            if cols[0] == "Assets:" {
                if cols.len() >= 3 {
                    report.base_asset = Some(cols[1].to_string());
                    report.quote_asset = Some(cols[2].to_string());
                } else if let Some(next) = next.filter(|n| n.len() >= 2) {
                    report.base_asset = Some(next[0].to_string());
                    report.quote_asset = Some(next[1].to_string());
                }
            }

            if cols.len() < 2 {
                continue;
            }

            match cols[0] {
                "Total" => report.total = last_two(cols),
                "Available" => report.available = last_two(cols),
                "Exchange" => {
                    if let Some(row) = inline_market_row(cols) {
                        report.prices = Some(row);
                    } else if let Some(next) = next.filter(|n| n.len() >= 5) {
                        report.prices = Some(MarketRow {
                            bid: next[2].to_string(),
                            ask: next[3].to_string(),
                            mid: next[4].to_string(),
                        });
                    }
                }
                _ => {}
            }
        }

        report
    }
}

fn last_two(cols: &[&str]) -> Option<(String, String)> {
    if cols.len() < 3 {
        return None;
    }
    let n = cols.len();
    Some((cols[n - 2].to_string(), cols[n - 1].to_string()))
}

/// An `Exchange` row that already carries the three price columns
fn inline_market_row(cols: &[&str]) -> Option<MarketRow> {
    let n = cols.len();
    if n < 4 {
        return None;
    }
    let tail = &cols[n - 3..];
    if tail.iter().all(|c| try_parse(c).is_some()) {
        Some(MarketRow {
            bid: tail[0].to_string(),
            ask: tail[1].to_string(),
            mid: tail[2].to_string(),
        })
    } else {
        None
    }
}
