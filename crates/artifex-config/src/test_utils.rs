/// Runs `f` with the given environment variables set, restoring the previous values after.
pub fn with_env<F>(vars: &[(&str, &str)], f: F)
where
    F: FnOnce(),
{
    let saved: Vec<_> = vars
        .iter()
        .map(|(key, value)| {
            let old = std::env::var(key).ok();
            std::env::set_var(key, value);
            (*key, old)
        })
        .collect();

    f();

    for (key, old) in saved {
        match old {
            Some(v) => std::env::set_var(key, v),
            None => std::env::remove_var(key),
        }
    }
}
