use canopy::{
    ontology_health, Checkpoint, FnEmbedder, OntologyConfig, Span, SpanId, SpanLabelMap,
    SpanPipeline, StoreKind, SynonymMap, TermPipeline, VectorStore,
};
use tracing_subscriber::EnvFilter;

/// Toy encoder: a few topic axes picked by keyword, plus a small length term
/// so vectors within a topic stay distinct.
fn topic_vector(text: &str) -> Vec<f32> {
    let t = text.to_lowercase();
    let axis = if ["apple", "cherry", "pear", "fruit"].iter().any(|w| t.contains(w)) {
        0
    } else if ["bank", "loan", "credit", "revenue"].iter().any(|w| t.contains(w)) {
        1
    } else {
        2
    };
    let mut v = vec![0.05 * (t.len() % 7) as f32; 3];
    v[axis] = 1.0;
    v
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG=canopy=debug shows batch and recluster decisions.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let dir = std::env::temp_dir().join("canopy-demo");
    let config = OntologyConfig::new()
        .with_items_per_cluster(3)
        .with_max_top_parents(4)
        .with_span_items_per_cluster(2);
    let words = VectorStore::open_or_create(
        &VectorStore::path_for(&dir, "demo", "topic", StoreKind::Words),
        3,
    )?;
    let mut checkpoint = Checkpoint::load(&dir, "demo")?;

    let embedder = FnEmbedder::new("topic", 3, topic_vector);
    let mut terms = TermPipeline::new(config.clone(), embedder, words)?
        .with_vocabulary(checkpoint.vocabulary.clone())
        .with_stopwords(checkpoint.stopwords.clone());
    terms.observe_terms(&[
        ("apple", 2.1),
        ("apples", 3.4),
        ("Apple_Inc", 4.0),
        ("cherry", 2.9),
        ("cherries", 4.2),
        ("pear", 3.1),
        ("bank", 2.0),
        ("banks", 3.0),
        ("loan", 2.7),
        ("credit", 2.5),
        ("weather", 2.2),
        ("rain", 2.4),
    ])?;
    let synonyms: SynonymMap = terms.cluster_and_label(&checkpoint.synonyms)?;
    terms.store_mut().flush()?;

    for (term, label) in synonyms.iter() {
        println!("{term:>12} -> {label}");
    }
    println!("{}", ontology_health(&synonyms, config.max_ontology_depth));

    let spans_store = VectorStore::open_or_create(
        &VectorStore::path_for(&dir, "demo", "topic", StoreKind::Spans),
        3,
    )?;
    let mut spans = SpanPipeline::new(config, FnEmbedder::new("topic", 3, topic_vector), spans_store)?
        .with_term_weights(terms.vocabulary().clone())
        .with_state(checkpoint.tfidf.clone(), checkpoint.batches);
    let batch: Vec<Span> = [
        "The Organization raised loan rates",
        "credit demand slowed at banks",
        "fresh cherry harvest arrived",
        "apple prices fell after harvest",
        "heavy rain expected tomorrow",
    ]
    .iter()
    .enumerate()
    .map(|(i, text)| Span::new(SpanId::new("news.txt", i + 1, 4), *text))
    .collect();
    let span_labels: SpanLabelMap = spans.cluster_spans(&batch, &checkpoint.spans)?;
    spans.store_mut().flush()?;

    for span in &batch {
        println!(
            "{} [{}] {}",
            span.id,
            span_labels.label(&span.id).unwrap_or("-"),
            span.text
        );
    }

    checkpoint.synonyms = synonyms;
    checkpoint.vocabulary = terms.vocabulary().clone();
    checkpoint.stopwords = terms.stopwords().clone();
    checkpoint.spans = span_labels;
    checkpoint.tfidf = spans.tfidf().clone();
    checkpoint.batches = spans.batches();
    let path = checkpoint.save(&dir, "demo")?;
    println!("checkpoint: {}", path.display());
    Ok(())
}
