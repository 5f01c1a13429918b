use anyhow::Result;
use live_signals::HistoryDb;
use std::path::PathBuf;

fn main() -> Result<()> {
    let db_path = std::env::var("HISTORY_DB_PATH").unwrap_or_else(|_| "data/history.db".to_string());
    let db = HistoryDb::open(&PathBuf::from(&db_path))?;

    println!("db_path={db_path}");
    println!("signals: {}", db.signal_count()?);

    for (outcome, count) in db.outcome_counts()? {
        println!("{outcome}: {count}");
    }

    for (market, win, loss) in db.market_record()? {
        let decided = win + loss;
        let rate = if decided == 0 { 0.0 } else { win as f64 * 100.0 / decided as f64 };
        println!("market {market}: win={win} loss={loss} rate={rate:.1}%");
    }

    if let Some(day) = db.last_day()? {
        println!(
            "last_day: date={} total={} win={} loss={} rate={:.1}%",
            day.date,
            day.total,
            day.win,
            day.loss,
            day.success_rate * 100.0
        );
    } else {
        println!("last_day: <none>");
    }

    Ok(())
}
