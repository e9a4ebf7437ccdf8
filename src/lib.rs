pub mod api;
pub mod core;

/// 默认 info 级别，`RUST_LOG` 可覆盖；重复调用无副作用
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}
