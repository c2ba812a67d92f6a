//! Общеизвестные топики шины.

/// Сообщения от адаптера к расширениям.
pub const ADAPTER_TOPIC: &str = "from_adapter/extensions";
/// Сообщения от Scratch к расширениям.
pub const SCRATCH_TOPIC: &str = "from_scratch/extensions";
/// Уведомления, которые расширение показывает пользователю.
pub const NOTIFICATION_TOPIC: &str = "notification";
/// Статус расширения.
pub const STATUS_TOPIC: &str = "from_adapter/extensions/status";
/// Управляющий канал: команды `start`/`stop`, адресованные узлу по имени.
pub const OPERATE_TOPIC: &str = "adapter_core/exts/operate";
