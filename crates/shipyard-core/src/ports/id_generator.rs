//! IdGenerator port - ID 生成の抽象化
//!
//! app_id はクラスタオブジェクト名の語幹にもなるため、小文字英数字のみで
//! 構成される必要があります。ULID (Crockford base32) を小文字化したものは
//! この条件を満たします。
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use ulid::Ulid;

use crate::domain::AppId;
use crate::ports::Clock;

/// IdGenerator は app_id を発行
///
/// # 不変条件
/// - 一度発行した ID は再発行しない（削除後も）
/// - clone は常に新しい ID を使う
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数スレッドから使える）
pub trait IdGenerator: Send + Sync {
    fn generate_app_id(&self) -> AppId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
/// テスト時に FixedClock を使うと timestamp 部分が固定されます。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_app_id(&self) -> AppId {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        AppId::from_ulid(ulid)
    }
}
