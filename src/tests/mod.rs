#[cfg(test)]
mod drain_suite;
