//! Embed a few sentences with a local fastembed model and compare them.
//!
//! Run with: cargo run -p docvault-embed --example simple_embedding

use docvault_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider, LocalModel};

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm = |v: &[f32]| v.iter().map(|x| x * x).sum::<f32>().sqrt();
    dot / (norm(a) * norm(b)).max(f32::EPSILON)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cache_dir = tempfile::tempdir()?;
    let config = EmbedConfig::new(LocalModel::AllMiniLmL6V2, cache_dir.path())
        .with_batch_size(2)
        .with_download_progress(true);

    println!("Loading {} ...", config.model_name());
    let provider = FastEmbedProvider::create(config).await?;
    println!(
        "Provider '{}' ready, dimension {}",
        provider.provider_name(),
        provider.embedding_dimension()
    );

    let texts = vec![
        "Server uptime was 99.8% this quarter.".to_string(),
        "The infrastructure stayed available almost all the time.".to_string(),
        "Budget utilization reached 92%.".to_string(),
    ];
    let result = provider.embed_texts(&texts).await?;

    let query = provider.embed_text("How reliable were the servers?").await?;
    for (text, embedding) in texts.iter().zip(&result.embeddings) {
        println!("{:.3}  {text}", cosine(&query, embedding));
    }

    Ok(())
}
