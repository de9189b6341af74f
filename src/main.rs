use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Map;

use llmperf_client::config::{parse_json_or_string, CliArgs};
use llmperf_client::{ChatCompletionsClient, ClientConfig, Prompt, RequestConfig, RequestOutcome};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Initialize logging with the configured level
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(args.log_level.to_lowercase()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    if args.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    // Configuration errors are fatal before any request is attempted
    let config = ClientConfig::from_env().context("Failed to load client configuration")?;
    let client = ChatCompletionsClient::new(config).context("Failed to initialize client")?;
    tracing::info!(url = %client.url(), model = %args.model, "Client ready");

    let prompt_tokens = client.token_counter().count_text(&args.prompt);
    let request = RequestConfig {
        model: args.model,
        prompt: Prompt::new(args.prompt, prompt_tokens),
        sampling_params: args.params.into_iter().collect::<Map<_, _>>(),
        provider: args.provider.as_deref().map(parse_json_or_string),
        llm_api: Some("openai".to_string()),
        metadata: None,
    };

    let outcome = client.execute(request).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    match outcome {
        RequestOutcome::Success { metrics, .. } => {
            tracing::info!(
                ttft_s = metrics.time_to_first_token.as_secs_f64(),
                itl_s = metrics.mean_inter_token_latency.as_secs_f64(),
                e2e_s = metrics.end_to_end_latency.as_secs_f64(),
                throughput = metrics.output_throughput,
                "Request succeeded"
            );
            Ok(())
        }
        RequestOutcome::Failed { metrics, .. } => {
            anyhow::bail!(
                "Request failed (code {:?}): {}",
                metrics.error_code,
                metrics.error_message
            )
        }
        RequestOutcome::Empty { .. } => anyhow::bail!("No tokens received"),
    }
}
