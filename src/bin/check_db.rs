use sqlx::postgres::PgPoolOptions;
use std::env;

// Quick operator check: row counts per table and open-visit totals.

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new().connect(&database_url).await?;

    for table in [
        "users",
        "stores",
        "store_visits",
        "task_assignments",
        "osa_records",
        "displays",
        "surveys",
        "promotions",
        "task_batches",
        "tasks",
    ] {
        let count: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&pool)
            .await?;
        println!("{table}: {} rows", count.0);
    }

    let open: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM store_visits WHERE status = 'CHECKED_IN'")
            .fetch_one(&pool)
            .await?;
    println!("open visits: {}", open.0);

    let pending: (i64, i64, i64) = sqlx::query_as(
        "SELECT \
            (SELECT COUNT(*) FROM osa_records WHERE status = 'PENDING'), \
            (SELECT COUNT(*) FROM displays WHERE status = 'PENDING'), \
            (SELECT COUNT(*) FROM surveys WHERE status = 'PENDING')",
    )
    .fetch_one(&pool)
    .await?;
    println!(
        "pending approvals: osa={} displays={} surveys={}",
        pending.0, pending.1, pending.2
    );

    Ok(())
}
