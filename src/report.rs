// src/report.rs
use rust_decimal::Decimal;
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::aggregator::{HourlyBucket, Summary};
use crate::models::ClassifiedTransaction;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

const DETAIL_HEADER: [&str; 17] = [
    "Date",
    "Hour",
    "Minute",
    "Transaction ID",
    "Wallet",
    "Method",
    "Action Summary",
    "wUSDC Deposit ($)",
    "wUSDC Withdrawal ($)",
    "wUSDC Fees ($)",
    "Gas Fee (ETH)",
    "Gas Fee (USD)",
    "ETH Price (USD)",
    "Orders Created",
    "Buy Orders",
    "Sell Orders",
    "Orders Closed",
];

const HOURLY_HEADER: [&str; 18] = [
    "Date",
    "Hour",
    "Transactions",
    "Unique Wallets",
    "wUSDC Deposits ($)",
    "wUSDC Withdrawals ($)",
    "wUSDC Fees ($)",
    "Gas Fee (ETH)",
    "Gas Fee (USD)",
    "Orders Created",
    "Buy Orders",
    "Sell Orders",
    "Orders Closed",
    "Multicalls",
    "AddMargins",
    "RemoveMargins",
    "CreateOrders",
    "CloseOrders",
];

/// Fixed-point rendering with exactly `dp` decimals.
fn fixed(value: Decimal, dp: u32) -> String {
    format!("{:.*}", dp as usize, value.round_dp(dp))
}

/// `fees.csv` → `fees_hourly.csv`
pub fn hourly_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match output.extension() {
        Some(ext) => format!("{}_hourly.{}", stem, ext.to_string_lossy()),
        None => format!("{}_hourly", stem),
    };
    output.with_file_name(name)
}

pub fn write_details(path: &Path, results: &[ClassifiedTransaction]) -> Result<(), ReportError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(DETAIL_HEADER)?;

    for r in results {
        writer.write_record([
            r.timestamp.format("%Y-%m-%d").to_string(),
            r.timestamp.format("%H").to_string(),
            r.timestamp.format("%M").to_string(),
            r.hash.clone(),
            r.wallet.to_string(),
            r.method.to_string(),
            r.action_summary(),
            fixed(r.deposit_amount, 6),
            fixed(r.withdrawal_amount, 6),
            fixed(r.fee_amount, 6),
            fixed(r.gas_cost_native, 10),
            fixed(r.gas_cost_fiat, 4),
            fixed(r.fiat_price, 2),
            r.orders_created.to_string(),
            r.buy_orders.to_string(),
            r.sell_orders.to_string(),
            r.orders_closed.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

pub fn write_hourly(path: &Path, buckets: &[HourlyBucket]) -> Result<(), ReportError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(HOURLY_HEADER)?;

    for b in buckets {
        writer.write_record([
            b.hour.format("%Y-%m-%d").to_string(),
            b.hour.format("%H").to_string(),
            b.transactions.to_string(),
            b.unique_wallets().to_string(),
            fixed(b.deposits, 2),
            fixed(b.withdrawals, 2),
            fixed(b.fees, 2),
            fixed(b.gas_native, 6),
            fixed(b.gas_fiat, 2),
            b.orders_created.to_string(),
            b.buy_orders.to_string(),
            b.sell_orders.to_string(),
            b.orders_closed.to_string(),
            b.multicalls.to_string(),
            b.add_margins.to_string(),
            b.remove_margins.to_string(),
            b.create_orders.to_string(),
            b.close_orders.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

fn short_address(addr: &str) -> String {
    match (addr.get(..10), addr.get(addr.len().saturating_sub(6)..)) {
        (Some(head), Some(tail)) if addr.len() > 16 => format!("{}...{}", head, tail),
        _ => addr.to_string(),
    }
}

/// Console summary. `heading` is the run label, e.g. a wallet or "ALL WALLETS".
pub fn render_summary(summary: &Summary, heading: &str, wallet_breakdown: bool) -> String {
    let mut out = String::new();
    // writing into a String cannot fail
    let _ = write_summary(&mut out, summary, heading, wallet_breakdown);
    out
}

fn write_summary(out: &mut String, summary: &Summary, heading: &str, wallet_breakdown: bool) -> fmt::Result {
    let rule = "=".repeat(70);
    let thin = "-".repeat(70);

    if summary.transactions == 0 {
        return writeln!(out, "\nNo transactions found in the specified date range.");
    }

    writeln!(out, "\n{}", rule)?;
    if wallet_breakdown {
        writeln!(out, "SUMMARY ({} wallets)", summary.by_wallet.len())?;
    } else {
        writeln!(out, "SUMMARY: {}", heading)?;
    }
    writeln!(out, "{}", rule)?;

    if wallet_breakdown && summary.by_wallet.len() > 1 {
        writeln!(out, "\nTOP WALLETS BY TRANSACTIONS:")?;
        writeln!(out, "{}", thin)?;
        for (wallet, stats) in summary.top_wallets(10) {
            writeln!(
                out,
                "  {}  {:5} txs  {:6} orders  ${} gas",
                short_address(&wallet.to_string()),
                stats.transactions,
                stats.orders_created,
                fixed(stats.gas_fiat, 2)
            )?;
        }
    }

    writeln!(out, "\nACCOUNT ACTIVITY: ${} net", fixed(summary.net_account_change(), 2))?;
    writeln!(out, "{}", thin)?;
    writeln!(out, "  Deposits (addMargin):       ${:>12}", fixed(summary.deposits, 2))?;
    writeln!(out, "  Withdrawals (removeMargin): ${:>12}", fixed(summary.withdrawals, 2))?;

    writeln!(
        out,
        "\nTRADING ACTIVITY: {} created | {} closed",
        summary.orders_created, summary.orders_closed
    )?;
    writeln!(out, "{}", thin)?;
    writeln!(out, "  Buy Orders:    {}", summary.buy_orders)?;
    writeln!(out, "  Sell Orders:   {}", summary.sell_orders)?;

    writeln!(
        out,
        "\nTRANSACTIONS BY TYPE: {} txs | ${} gas",
        summary.transactions,
        fixed(summary.gas_fiat, 2)
    )?;
    writeln!(out, "{}", thin)?;
    for (method, stats) in summary.methods_by_count() {
        writeln!(
            out,
            "  {:20}  {:6} txs    ${} gas",
            method.as_str(),
            stats.transactions,
            fixed(stats.gas_fiat, 2)
        )?;
    }

    writeln!(out, "\nCOSTS: ${} total", fixed(summary.total_cost(), 2))?;
    writeln!(out, "{}", thin)?;
    writeln!(out, "  Order Fees (wUSDC):  ${:>12}", fixed(summary.fees, 2))?;
    writeln!(out, "  Gas Fees (ETH):      {:>12} ETH", fixed(summary.gas_native, 6))?;
    writeln!(out, "  Gas Fees (USD):      ${:>12}", fixed(summary.gas_fiat, 2))?;

    if let Some((avg_fee, avg_gas)) = summary.per_trade_averages() {
        writeln!(
            out,
            "\nPER-TRADE AVERAGES (multicall): ${}/trade",
            fixed(avg_fee + avg_gas, 4)
        )?;
        writeln!(out, "{}", thin)?;
        writeln!(out, "  Avg Order Fees:   ${}", fixed(avg_fee, 4))?;
        writeln!(out, "  Avg Gas:          ${}", fixed(avg_gas, 4))?;
    }

    writeln!(out, "{}", rule)
}
