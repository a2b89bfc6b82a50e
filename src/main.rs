use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use docqa::config::AppConfig;
use docqa::intake;
use docqa::models::AnswerStatus;
use docqa::oracle::{JudgmentOracle, OpenAiClient};
use docqa::pipeline::DocQaService;
use docqa::record;
use docqa::tokenize::BpeTokenCounter;

#[derive(Parser, Debug)]
#[command(name = "docqa")]
#[command(about = "Answer questions against long Chinese PDF documents")]
struct Cli {
    /// Free-form request, e.g. "请回答合同中违约责任的规定是什么？文档路径是 /docs/contract.pdf"
    input: Option<String>,

    /// Ask a question directly, skipping the intake extraction step
    #[arg(long, requires = "doc")]
    question: Option<String>,

    /// PDF path, used together with --question
    #[arg(long, requires = "question")]
    doc: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    let oracle: Arc<dyn JudgmentOracle> = Arc::new(OpenAiClient::new(config.oracle.clone()));
    let counter = Arc::new(BpeTokenCounter::new()?);
    let service = DocQaService::new(config.clone(), Arc::clone(&oracle), counter);

    let (question, doc_path) = match (cli.question, cli.doc) {
        (Some(question), Some(doc)) => (question, doc),
        _ => {
            let user_input = match cli.input {
                Some(input) => input,
                None => read_stdin_line()?,
            };
            if user_input.trim().is_empty() {
                anyhow::bail!("输入不能为空");
            }

            let extracted = match intake::extract_query(oracle.as_ref(), &user_input).await {
                Ok(extracted) => extracted,
                Err(err) => {
                    record_failure(&config, "invalid_input", &user_input, &err).await;
                    return Err(err);
                }
            };
            tracing::info!(
                question = %extracted.question,
                doc = %extracted.doc_path,
                "extracted query from input"
            );
            (extracted.question, PathBuf::from(extracted.doc_path))
        }
    };

    if !doc_path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
    {
        let err = anyhow::anyhow!("只支持 PDF 文档：{}", doc_path.display());
        record_failure(&config, &question, &doc_path.display().to_string(), &err).await;
        return Err(err);
    }

    let session = match service.answer_question(&question, &doc_path).await {
        Ok(session) => session,
        Err(err) => {
            record_failure(&config, &question, &question, &err).await;
            return Err(err);
        }
    };

    let record_path = record::write_record(&config.qa_log_dir, &session).await?;
    tracing::info!(record = %record_path.display(), "qa record saved");

    println!("\n最终结果：");
    match &session.answer.status {
        AnswerStatus::Success => {
            println!("答案：{}", session.answer.text);
            println!("答案是否正确：{}", if session.verified { "是" } else { "否" });
        }
        AnswerStatus::Error(reason) => {
            println!("答案生成失败：{reason}");
        }
    }

    Ok(())
}

async fn record_failure(config: &AppConfig, label: &str, input: &str, err: &anyhow::Error) {
    if let Err(write_err) =
        record::write_failure(&config.qa_log_dir, label, input, &format!("{err:#}")).await
    {
        tracing::warn!("failed to persist failure record: {write_err:#}");
    }
}

fn read_stdin_line() -> Result<String> {
    println!("请输入您的问题和文档的本地绝对路径，例如：");
    println!("请回答合同中关于违约责任的规定是什么？文档路径是 /docs/contract.pdf");
    print!("> ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
