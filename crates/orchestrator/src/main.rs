/// Main pipeline binary: process one uploaded video end-to-end
use std::sync::Arc;

use tracing::info;

use video_narrative_aggregator::{Aggregator, AggregatorConfig};
use video_narrative_common::{RunStatus, TracingObserver, VideoSource};
use video_narrative_describer::{BatchDescriber, DescriberConfig};
use video_narrative_frames::{FfmpegFrameExtractor, FrameExtractorConfig};
use video_narrative_model::{BedrockModelClient, InferenceParams, ModelConfig};
use video_narrative_orchestrator::{Pipeline, PipelineConfig};
use video_narrative_prompts::PromptResolver;
use video_narrative_storage::{
    AnalysisStore, PostgresAnalysisStore, PostgresPromptStore, PromptStore, S3ObjectStorage,
    StorageConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Video Narrative Pipeline v0.1.0");

    // Check for command line arguments
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <video-object-key>", args[0]);
        std::process::exit(1);
    }
    let object_key = &args[1];

    let storage_config = StorageConfig::default();
    let pipeline_config = PipelineConfig::default();

    let video = VideoSource::new(
        &storage_config.s3.video_bucket,
        &storage_config.s3.region,
        object_key,
    );
    info!("Starting processing of video '{}' => VideoID='{}'", video.s3_uri, video.id);

    // Storage backends
    let videos = Arc::new(S3ObjectStorage::videos(&storage_config.s3));
    let images = Arc::new(S3ObjectStorage::images(&storage_config.s3));

    let analyses = Arc::new(PostgresAnalysisStore::new(storage_config.postgres.clone()).await?);
    analyses.init_schema().await?;
    let prompt_store = Arc::new(PostgresPromptStore::new(storage_config.postgres.clone()).await?);
    prompt_store.init_schema().await?;

    // Model backend and stages
    let model = Arc::new(BedrockModelClient::new(&ModelConfig::default()));
    let resolver = Arc::new(PromptResolver::new(prompt_store));
    let observer = Arc::new(TracingObserver);

    let frames = Arc::new(FfmpegFrameExtractor::new(
        videos,
        images.clone(),
        FrameExtractorConfig {
            fps: 1,
            batch_size: pipeline_config.batch_size,
        },
    ));
    let describer = Arc::new(BatchDescriber::new(
        images,
        analyses.clone(),
        resolver.clone(),
        model.clone(),
        observer.clone(),
        DescriberConfig {
            model_id: pipeline_config.model_for_describe.clone(),
            params: InferenceParams::deterministic(),
            call_timeout: pipeline_config.time_budget_per_call,
        },
    ));
    let aggregator = Arc::new(Aggregator::new(
        analyses,
        resolver,
        model,
        observer.clone(),
        AggregatorConfig {
            model_id: pipeline_config.model_for_aggregate.clone(),
            params: InferenceParams::deterministic(),
            call_timeout: pipeline_config.time_budget_per_call,
        },
    ));

    let pipeline = Pipeline::new(pipeline_config, frames, describer, aggregator, observer);

    let run_id = format!("run-{}", uuid::Uuid::new_v4());
    info!("Starting {run_id} for video '{}'", video.id);

    let outcome = pipeline.run(video).await;

    println!("\n=== Run Result ===");
    println!("Video ID: {}", outcome.video_id);
    println!("Status: {:?}", outcome.status);
    println!("Message: {}", outcome.message);
    println!("Batches described: {}", outcome.batches.len());
    for batch in &outcome.batches {
        let marker = if batch.outcome.is_failed() { "degraded" } else { "ok" };
        println!("  {}: {marker}", batch.sequence_id);
    }
    if let Some(summary) = &outcome.summary {
        println!("\nSummary:\n{}", summary.record_text());
    }

    if outcome.status == RunStatus::ExtractionFailed {
        std::process::exit(1);
    }

    Ok(())
}
