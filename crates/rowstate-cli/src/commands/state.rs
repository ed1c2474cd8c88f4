use std::path::Path;

use rowstate::{
    BatchRequest, DeleteRequest, GetRequest, GetResponse, SetRequest, StateAccess, StateStore,
};
use serde_json::{json, Value};

pub fn init(store: &StateStore) -> anyhow::Result<()> {
    println!("✓ State table ready ({} backend)", store.backend());
    Ok(())
}

pub async fn get(store: &StateStore, key: &str) -> anyhow::Result<()> {
    let resp = store.get(&GetRequest::new(key)).await?;
    println!("{}", serde_json::to_string_pretty(&render(key, &resp)?)?);
    Ok(())
}

pub async fn set(
    store: &StateStore,
    key: &str,
    value: &str,
    etag: Option<String>,
) -> anyhow::Result<()> {
    let value: Value = serde_json::from_str(value)
        .map_err(|e| anyhow::anyhow!("value is not valid JSON: {e}"))?;
    let mut req = SetRequest::new(key, value);
    req.etag = etag;
    store.set(&req).await?;
    println!("✓ Stored {key}");
    Ok(())
}

pub async fn delete(store: &StateStore, key: &str, etag: Option<String>) -> anyhow::Result<()> {
    let mut req = DeleteRequest::new(key);
    req.etag = etag;
    store.delete(&req).await?;
    println!("✓ Deleted {key}");
    Ok(())
}

pub async fn batch(store: &StateStore, path: &Path) -> anyhow::Result<()> {
    let batch = read_batch(path)?;
    store.execute_batch(&batch.deletes, &batch.sets).await?;
    println!(
        "✓ Applied batch ({} deletes, {} sets)",
        batch.deletes.len(),
        batch.sets.len()
    );
    Ok(())
}

fn read_batch(path: &Path) -> anyhow::Result<BatchRequest> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    Ok(serde_json::from_str(&content)?)
}

fn render(key: &str, resp: &GetResponse) -> anyhow::Result<Value> {
    match resp.json::<Value>()? {
        Some(value) => Ok(json!({ "key": key, "value": value, "etag": resp.etag })),
        None => Ok(json!({ "key": key, "found": false })),
    }
}
