//! 交互式菜单

use anyhow::{Context, Result};
use dialoguer::{theme::ColorfulTheme, Input, Select};
use tablegate::{Crud, Record, TableAccessor};

use crate::{confirm_delete, display, require_pairs};

const ITEMS: &[&str] = &[
    "View All Records",
    "View Records with Filter",
    "Insert New Record",
    "Update Record",
    "Delete Record",
    "Run SQL",
    "Switch Table",
    "Exit",
];

pub async fn run(table: &TableAccessor) -> Result<()> {
    let theme = ColorfulTheme::default();
    let mut current = table.clone();

    loop {
        println!("\n╔════════════════════════════════════════╗");
        println!("║     DATABASE MANAGEMENT SYSTEM         ║");
        println!("╚════════════════════════════════════════╝");

        let choice = Select::with_theme(&theme)
            .with_prompt(format!("Table '{}'", current.table_name()))
            .items(ITEMS)
            .default(0)
            .interact()
            .context("Failed to get user input")?;

        let outcome = match choice {
            0 => view_all(&current).await,
            1 => view_filtered(&theme, &current).await,
            2 => insert(&theme, &current).await,
            3 => update(&theme, &current).await,
            4 => delete(&theme, &current).await,
            5 => raw_sql(&theme, &current).await,
            6 => match switch_table(&theme, &current).await {
                Ok(next) => {
                    current = next;
                    println!("✅ Now using table '{}'", current.table_name());
                    Ok(())
                }
                Err(e) => Err(e),
            },
            _ => {
                println!("\n👋 Goodbye!");
                return Ok(());
            }
        };

        if let Err(e) = outcome {
            eprintln!("❌ Error: {:#}", e);
        }
    }
}

/// 逐个读取 `列名 / 值`，列名留空结束
fn read_pairs(theme: &ColorfulTheme, label: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    loop {
        let column: String = Input::with_theme(theme)
            .with_prompt(format!("{} #{} - Column name (empty to finish)", label, pairs.len() + 1))
            .allow_empty(true)
            .interact_text()
            .context("Failed to get user input")?;
        let column = column.trim().to_string();
        if column.is_empty() {
            return Ok(pairs);
        }
        let value: String = Input::with_theme(theme)
            .with_prompt(format!("{} #{} - Value", label, pairs.len() + 1))
            .allow_empty(true)
            .interact_text()
            .context("Failed to get user input")?;
        pairs.push((column, value.trim().to_string()));
    }
}

async fn view_all(table: &TableAccessor) -> Result<()> {
    println!("\n📋 Fetching all records...");
    let rows = table.select_all().await?;
    print!("{}", display::render_table(table.table_name(), &rows));
    Ok(())
}

async fn view_filtered(theme: &ColorfulTheme, table: &TableAccessor) -> Result<()> {
    println!("\n🔍 Filter Records");
    let filters: Record = read_pairs(theme, "Filter")?.into_iter().collect();
    // 不输入条件时等同于查看全部
    let rows = table.select(&filters).await?;
    let title = format!("{} (Filtered)", table.table_name());
    print!("{}", display::render_table(&title, &rows));
    Ok(())
}

async fn insert(theme: &ColorfulTheme, table: &TableAccessor) -> Result<()> {
    println!("\n➕ Insert New Record");
    let data: Record = read_pairs(theme, "Column")?.into_iter().collect();
    let row = table.insert(&data).await?;
    println!("\n✅ Successfully inserted record!");
    println!("Returned data:");
    print!("{}", display::render_row(&row));
    Ok(())
}

async fn update(theme: &ColorfulTheme, table: &TableAccessor) -> Result<()> {
    println!("\n✏️  Update Record");
    println!("\n--- WHERE Clause (which records to update) ---");
    let filters = read_pairs(theme, "Filter")?;
    require_pairs(&filters, "filter")?;
    println!("\n--- SET Clause (what to update) ---");
    let data = read_pairs(theme, "Column")?;

    let data: Record = data.into_iter().collect();
    let filters: Record = filters.into_iter().collect();
    let result = table.update(&data, &filters).await?;
    println!("\n✅ Updated {} record(s)", result.rows_affected);
    Ok(())
}

async fn delete(theme: &ColorfulTheme, table: &TableAccessor) -> Result<()> {
    println!("\n🗑️  Delete Record");
    let filters = read_pairs(theme, "Filter")?;
    require_pairs(&filters, "filter")?;
    if !confirm_delete(table.table_name())? {
        println!("❌ Delete cancelled");
        return Ok(());
    }
    let filters: Record = filters.into_iter().collect();
    let result = table.delete(&filters).await?;
    println!("\n✅ Deleted {} record(s)", result.rows_affected);
    Ok(())
}

async fn raw_sql(theme: &ColorfulTheme, table: &TableAccessor) -> Result<()> {
    let sql: String = Input::with_theme(theme)
        .with_prompt("SQL")
        .interact_text()
        .context("Failed to get user input")?;
    let output = table.query(&sql, &[]).await?;
    if output.rows.is_empty() {
        println!("✅ {} row(s) affected", output.row_count);
    } else {
        print!("{}", display::render_table("query", &output.rows));
    }
    Ok(())
}

async fn switch_table(theme: &ColorfulTheme, table: &TableAccessor) -> Result<TableAccessor> {
    let name: String = Input::with_theme(theme)
        .with_prompt("Table name")
        .interact_text()
        .context("Failed to get user input")?;
    table
        .with_table(name.trim())
        .await
        .with_context(|| format!("Failed to open table '{}'", name.trim()))
}
