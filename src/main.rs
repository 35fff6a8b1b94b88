// ==========================================
// Analitik ETL - 命令行入口
// ==========================================
// 用法:
//   analitik-etl import <tenant-id> <archivo.xlsx>
//   analitik-etl status <run-id>
//   analitik-etl report <run-id>
//   analitik-etl history <tenant-id> [page] [page-size]
// 输出: stdout 为 JSON；日志写 stderr
// 环境变量: ANALITIK_DB_PATH（数据库路径）、ANALITIK_LOCALE（es/en）
// ==========================================

use analitik_etl::db::default_db_path;
use analitik_etl::{i18n, logging, ImportApi};
use anyhow::{bail, Context, Result};
use serde::Serialize;
use uuid::Uuid;

const USAGE: &str = "\
uso:
  analitik-etl import <tenant-id> <archivo.xlsx>
  analitik-etl status <run-id>
  analitik-etl report <run-id>
  analitik-etl history <tenant-id> [page] [page-size]";

fn parse_uuid(raw: Option<&String>, name: &str) -> Result<Uuid> {
    let raw = raw.with_context(|| format!("falta el argumento <{}>\n{}", name, USAGE))?;
    Uuid::parse_str(raw).with_context(|| format!("<{}> no es un UUID válido: {}", name, raw))
}

fn parse_page(raw: Option<&String>, default: u32) -> Result<u32> {
    match raw {
        Some(value) => value
            .parse::<u32>()
            .with_context(|| format!("número de página inválido: {}", value)),
        None => Ok(default),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志系统
    logging::init();

    if let Ok(locale) = std::env::var("ANALITIK_LOCALE") {
        i18n::set_locale(locale.trim());
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        bail!("{}", USAGE);
    };

    let db_path = default_db_path();
    tracing::info!(db_path = %db_path, version = analitik_etl::VERSION, "使用数据库");
    let api = ImportApi::new(db_path);

    match command.as_str() {
        "import" => {
            let tenant_id = parse_uuid(args.get(1), "tenant-id")?;
            let file = args
                .get(2)
                .with_context(|| format!("falta el argumento <archivo.xlsx>\n{}", USAGE))?;
            let outcome = api.import_file(tenant_id, file).await?;
            print_json(&outcome)?;
            if !outcome.success {
                std::process::exit(2);
            }
        }
        "status" => {
            let run_id = parse_uuid(args.get(1), "run-id")?;
            print_json(&api.status(run_id).await?)?;
        }
        "report" => {
            let run_id = parse_uuid(args.get(1), "run-id")?;
            print_json(&api.report(run_id).await?)?;
        }
        "history" => {
            let tenant_id = parse_uuid(args.get(1), "tenant-id")?;
            let page = parse_page(args.get(2), 1)?;
            let page_size = parse_page(args.get(3), 20)?;
            print_json(&api.history(tenant_id, page, page_size).await?)?;
        }
        other => bail!("comando desconocido: {}\n{}", other, USAGE),
    }

    Ok(())
}
