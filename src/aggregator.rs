// src/aggregator.rs
use alloy::primitives::Address;
use chrono::{DateTime, Duration, DurationRound, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::models::{ClassifiedTransaction, MethodCategory, TxRecord};

/// Totals for one clock hour.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyBucket {
    pub hour: DateTime<Utc>,
    pub transactions: u32,
    wallets: HashSet<Address>,
    pub deposits: Decimal,
    pub withdrawals: Decimal,
    pub fees: Decimal,
    pub gas_native: Decimal,
    pub gas_fiat: Decimal,
    pub orders_created: u32,
    pub buy_orders: u32,
    pub sell_orders: u32,
    pub orders_closed: u32,
    pub multicalls: u32,
    pub add_margins: u32,
    pub remove_margins: u32,
    pub create_orders: u32,
    pub close_orders: u32,
}

impl HourlyBucket {
    pub fn new(hour: DateTime<Utc>) -> Self {
        Self {
            hour,
            transactions: 0,
            wallets: HashSet::new(),
            deposits: Decimal::ZERO,
            withdrawals: Decimal::ZERO,
            fees: Decimal::ZERO,
            gas_native: Decimal::ZERO,
            gas_fiat: Decimal::ZERO,
            orders_created: 0,
            buy_orders: 0,
            sell_orders: 0,
            orders_closed: 0,
            multicalls: 0,
            add_margins: 0,
            remove_margins: 0,
            create_orders: 0,
            close_orders: 0,
        }
    }

    pub fn unique_wallets(&self) -> usize {
        self.wallets.len()
    }

    fn fold(&mut self, tx: &ClassifiedTransaction) {
        self.transactions += 1;
        self.wallets.insert(tx.wallet);
        self.deposits += tx.deposit_amount;
        self.withdrawals += tx.withdrawal_amount;
        self.fees += tx.fee_amount;
        self.gas_native += tx.gas_cost_native;
        self.gas_fiat += tx.gas_cost_fiat;
        self.orders_created += tx.orders_created;
        self.buy_orders += tx.buy_orders;
        self.sell_orders += tx.sell_orders;
        self.orders_closed += tx.orders_closed;

        match tx.method {
            MethodCategory::Multicall => self.multicalls += 1,
            MethodCategory::AddMargin => self.add_margins += 1,
            MethodCategory::RemoveMargin => self.remove_margins += 1,
            MethodCategory::CreateOrder => self.create_orders += 1,
            MethodCategory::CloseOrder => self.close_orders += 1,
            MethodCategory::Unknown => {}
        }
    }
}

#[derive(Debug, Clone)]
pub struct Report {
    pub details: Vec<ClassifiedTransaction>,
    pub hourly: Vec<HourlyBucket>,
}

pub fn truncate_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(Duration::hours(1)).unwrap_or(ts)
}

/// Drop transactions sent by `exclude`. Runs before classification so
/// excluded wallets never reach any total.
pub fn exclude_wallet(txs: Vec<TxRecord>, exclude: Option<Address>) -> Vec<TxRecord> {
    match exclude {
        Some(excluded) => txs.into_iter().filter(|tx| tx.from != excluded).collect(),
        None => txs,
    }
}

/// Detail rows in input order plus one bucket per hour in `[start, end]`,
/// gaps included. Transactions outside the span only appear in the details.
pub fn aggregate(
    details: Vec<ClassifiedTransaction>,
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
) -> Report {
    let mut buckets: BTreeMap<DateTime<Utc>, HourlyBucket> = BTreeMap::new();

    let end_hour = truncate_to_hour(range_end);
    let mut hour = truncate_to_hour(range_start);
    while hour <= end_hour {
        buckets.insert(hour, HourlyBucket::new(hour));
        hour += Duration::hours(1);
    }

    for tx in &details {
        if let Some(bucket) = buckets.get_mut(&truncate_to_hour(tx.timestamp)) {
            bucket.fold(tx);
        }
    }

    Report {
        details,
        hourly: buckets.into_values().collect(),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodStats {
    pub transactions: u32,
    pub gas_fiat: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WalletStats {
    pub transactions: u32,
    pub gas_fiat: Decimal,
    pub orders_created: u32,
    pub deposits: Decimal,
}

/// Whole-run totals for the console summary.
#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub transactions: usize,
    pub fees: Decimal,
    pub deposits: Decimal,
    pub withdrawals: Decimal,
    pub gas_native: Decimal,
    pub gas_fiat: Decimal,
    pub orders_created: u32,
    pub orders_closed: u32,
    pub buy_orders: u32,
    pub sell_orders: u32,
    pub by_method: HashMap<MethodCategory, MethodStats>,
    pub by_wallet: HashMap<Address, WalletStats>,
    pub multicalls: u32,
    pub multicall_fees: Decimal,
    pub multicall_gas_fiat: Decimal,
}

impl Summary {
    pub fn from_results(results: &[ClassifiedTransaction]) -> Self {
        let mut s = Summary {
            transactions: results.len(),
            ..Default::default()
        };

        for r in results {
            s.fees += r.fee_amount;
            s.deposits += r.deposit_amount;
            s.withdrawals += r.withdrawal_amount;
            s.gas_native += r.gas_cost_native;
            s.gas_fiat += r.gas_cost_fiat;
            s.orders_created += r.orders_created;
            s.orders_closed += r.orders_closed;
            s.buy_orders += r.buy_orders;
            s.sell_orders += r.sell_orders;

            let method = s.by_method.entry(r.method).or_default();
            method.transactions += 1;
            method.gas_fiat += r.gas_cost_fiat;

            let wallet = s.by_wallet.entry(r.wallet).or_default();
            wallet.transactions += 1;
            wallet.gas_fiat += r.gas_cost_fiat;
            wallet.orders_created += r.orders_created;
            wallet.deposits += r.deposit_amount;

            if r.method == MethodCategory::Multicall {
                s.multicalls += 1;
                s.multicall_fees += r.fee_amount;
                s.multicall_gas_fiat += r.gas_cost_fiat;
            }
        }

        s
    }

    pub fn net_account_change(&self) -> Decimal {
        self.deposits - self.withdrawals
    }

    pub fn total_cost(&self) -> Decimal {
        self.fees + self.gas_fiat
    }

    /// Average fee and gas per multicall, `None` without multicalls.
    pub fn per_trade_averages(&self) -> Option<(Decimal, Decimal)> {
        if self.multicalls == 0 {
            return None;
        }
        let n = Decimal::from(self.multicalls);
        Some((self.multicall_fees / n, self.multicall_gas_fiat / n))
    }

    /// Methods by descending transaction count.
    pub fn methods_by_count(&self) -> Vec<(MethodCategory, &MethodStats)> {
        let mut methods: Vec<_> = self.by_method.iter().map(|(m, s)| (*m, s)).collect();
        methods.sort_by(|a, b| b.1.transactions.cmp(&a.1.transactions).then(a.0.cmp(&b.0)));
        methods
    }

    /// Wallets by descending transaction count, at most `limit`.
    pub fn top_wallets(&self, limit: usize) -> Vec<(Address, &WalletStats)> {
        let mut wallets: Vec<_> = self.by_wallet.iter().map(|(a, s)| (*a, s)).collect();
        wallets.sort_by(|a, b| b.1.transactions.cmp(&a.1.transactions).then(a.0.cmp(&b.0)));
        wallets.truncate(limit);
        wallets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;
    use chrono::TimeZone;

    const A: Address = address!("00000000000000000000000000000000000000aa");
    const B: Address = address!("00000000000000000000000000000000000000bb");

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 10, h, m, 0).unwrap()
    }

    fn result(ts: DateTime<Utc>, wallet: Address, method: MethodCategory, fee: i64) -> ClassifiedTransaction {
        ClassifiedTransaction {
            timestamp: ts,
            hash: format!("0x{:x}", ts.timestamp()),
            wallet,
            method,
            fee_amount: Decimal::new(fee, 0),
            deposit_amount: Decimal::ZERO,
            withdrawal_amount: Decimal::ZERO,
            gas_cost_native: Decimal::new(1, 3),
            gas_cost_fiat: Decimal::new(3, 0),
            fiat_price: Decimal::new(3000, 0),
            orders_created: 1,
            orders_closed: 0,
            buy_orders: 1,
            sell_orders: 0,
        }
    }

    fn tx_from(from: Address) -> TxRecord {
        TxRecord {
            hash: "0x1".to_string(),
            from,
            to: None,
            input: "0x".to_string(),
            gas_used: 0,
            gas_price: 0,
            timestamp: 0,
            failed: false,
        }
    }

    #[test]
    fn one_bucket_per_hour_including_empty_hours() {
        let report = aggregate(Vec::new(), at(0, 0), at(23, 59));
        assert_eq!(report.hourly.len(), 24);
        assert!(report.hourly.iter().all(|b| b.transactions == 0));
        assert_eq!(report.hourly[0].hour, at(0, 0));
        assert_eq!(report.hourly[23].hour, at(23, 0));
    }

    #[test]
    fn bucket_count_spans_days() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 1, 16, 23, 59, 59).unwrap();
        let report = aggregate(Vec::new(), start, end);
        let expected = (end - start).num_hours() as usize + 1;
        assert_eq!(report.hourly.len(), expected);
        assert_eq!(expected, 16 * 24);
    }

    #[test]
    fn transactions_fold_into_their_hour() {
        let details = vec![
            result(at(3, 5), A, MethodCategory::Multicall, 2),
            result(at(3, 55), B, MethodCategory::Multicall, 1),
            result(at(3, 59), A, MethodCategory::AddMargin, 0),
            result(at(5, 0), B, MethodCategory::RemoveMargin, 0),
        ];
        let report = aggregate(details, at(0, 0), at(6, 0));

        assert_eq!(report.details.len(), 4);
        assert_eq!(report.details[0].timestamp, at(3, 5));

        let three = &report.hourly[3];
        assert_eq!(three.transactions, 3);
        assert_eq!(three.unique_wallets(), 2);
        assert_eq!(three.fees, Decimal::new(3, 0));
        assert_eq!(three.gas_fiat, Decimal::new(9, 0));
        assert_eq!(three.multicalls, 2);
        assert_eq!(three.add_margins, 1);

        assert_eq!(report.hourly[4].transactions, 0);
        assert_eq!(report.hourly[5].remove_margins, 1);
    }

    #[test]
    fn out_of_range_transactions_stay_out_of_buckets() {
        let details = vec![result(at(9, 0), A, MethodCategory::Multicall, 1)];
        let report = aggregate(details, at(0, 0), at(2, 0));
        assert_eq!(report.details.len(), 1);
        assert!(report.hourly.iter().all(|b| b.transactions == 0));
    }

    #[test]
    fn exclusion_happens_on_sender() {
        let kept = exclude_wallet(vec![tx_from(A), tx_from(B), tx_from(A)], Some(A));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].from, B);

        assert_eq!(exclude_wallet(vec![tx_from(A)], None).len(), 1);
    }

    #[test]
    fn summary_totals_and_breakdowns() {
        let mut deposit = result(at(1, 0), B, MethodCategory::AddMargin, 0);
        deposit.deposit_amount = Decimal::new(500, 0);
        let mut withdrawal = result(at(2, 0), B, MethodCategory::RemoveMargin, 0);
        withdrawal.withdrawal_amount = Decimal::new(200, 0);

        let results = vec![
            result(at(0, 0), A, MethodCategory::Multicall, 2),
            result(at(0, 30), A, MethodCategory::Multicall, 4),
            deposit,
            withdrawal,
        ];
        let s = Summary::from_results(&results);

        assert_eq!(s.transactions, 4);
        assert_eq!(s.net_account_change(), Decimal::new(300, 0));
        assert_eq!(s.fees, Decimal::new(6, 0));
        assert_eq!(s.gas_fiat, Decimal::new(12, 0));
        assert_eq!(s.total_cost(), Decimal::new(18, 0));
        assert_eq!(s.per_trade_averages(), Some((Decimal::new(3, 0), Decimal::new(3, 0))));

        let methods = s.methods_by_count();
        assert_eq!(methods[0].0, MethodCategory::Multicall);
        assert_eq!(methods[0].1.transactions, 2);

        let top = s.top_wallets(1);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].0, A);
        assert_eq!(s.by_wallet[&B].deposits, Decimal::new(500, 0));
    }

    #[test]
    fn no_multicalls_means_no_averages() {
        let s = Summary::from_results(&[result(at(0, 0), A, MethodCategory::AddMargin, 0)]);
        assert_eq!(s.per_trade_averages(), None);
    }
}
