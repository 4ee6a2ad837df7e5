//! Blog API exposing the relations of a post as nested collections
//!
//! ```bash
//! cargo run --example blog_api
//! curl http://127.0.0.1:3000/posts/1/comments
//! curl -X PUT http://127.0.0.1:3000/posts/1/tags/2,3
//! curl -X PUT -d '{"role":"editor"}' http://127.0.0.1:3000/posts/1/authors/2
//! curl -X DELETE http://127.0.0.1:3000/posts/1/tags/2
//! ```

use anyhow::Result;
use nested_rest::prelude::*;
use tracing_subscriber::EnvFilter;

fn seed(store: &InMemoryStore) -> Result<()> {
    store.seed("Post", json!({ "title": "Nested routes in practice" }))?;
    store.seed("Post", json!({ "title": "An empty post" }))?;

    store.seed("Comment", json!({ "text": "First!", "post_id": 1 }))?;
    store.seed("Comment", json!({ "text": "Nice write-up", "post_id": 1 }))?;

    for name in ["rust", "rest", "axum"] {
        store.seed("Tag", json!({ "name": name }))?;
    }
    store.seed_junction("post_tag", json!({ "post_id": 1, "tag_id": 1 }))?;

    store.seed("User", json!({ "name": "Alice" }))?;
    store.seed("User", json!({ "name": "Bob" }))?;
    store.seed(
        "PostAuthor",
        json!({ "post_id": 1, "user_id": 1, "role": "author" }),
    )?;

    store.seed("Image", json!({ "url": "/img/cover.png", "post_id": 1 }))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = NestedConfig::default_config();
    let store = InMemoryStore::new(&config);
    seed(&store)?;

    println!("🚀 Nested REST blog example");
    println!("   GET    /posts/1/comments");
    println!("   GET    /posts/1/tags/1");
    println!("   POST   /posts/1/comments");
    println!("   PUT    /posts/1/tags/2,3");
    println!("   DELETE /posts/1/tags/2");
    println!("   DELETE /posts/1/tags");
    println!("   OPTIONS /posts/1/authors\n");

    ServerBuilder::new()
        .with_store(store)
        .with_config(config)
        .serve("127.0.0.1:3000")
        .await
}
