#[cfg(test)]
mod quick_cache_tests;
