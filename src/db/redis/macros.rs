/// Read-through caching over an optional [`Cache`](crate::db::Cache).
///
/// Looks `$key` up first and returns the hit. On a miss, or when no cache is
/// configured, awaits `$block`, queues the value for a background write with
/// `$ttl` seconds to live and returns it. A failing cache read is logged and
/// treated as a miss, so the cache can never fail the caller.
///
/// # Arguments
/// * `$cache`: `Option<&Cache>`
/// * `$key`: the `CacheKey` to read and write
/// * `$ttl`: time-to-live in seconds for freshly computed values
/// * `$block`: future yielding `AppResult<T>` when the key is absent
///
/// # Example
/// ```rust,ignore
/// let candidates: Vec<Newsletter> = cached!(self.cache.as_ref(), key, 300, async {
///     items.find(&ItemFilter::active(100)).await
/// })?;
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        let cache: Option<&$crate::db::Cache> = $cache;
        let key = &$key;
        let hit = match cache {
            Some(cache) => match cache.get_from_cache(key).await {
                Ok(hit) => hit,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Cache read failed, computing value");
                    None
                }
            },
            None => None,
        };

        match hit {
            Some(value) => {
                tracing::debug!(key = %key, "Cache hit");
                Ok(value)
            }
            None => match $block.await {
                Ok(value) => {
                    if let Some(cache) = cache {
                        cache.set_in_background(key, &value, $ttl);
                    }
                    Ok(value)
                }
                Err(e) => Err(e),
            },
        }
    }};
}
