use serde::{Deserialize, Serialize};

/// セクションごとに保持する例示アイテムの上限
pub const MAX_SECTION_ITEMS: usize = 5;

/// ジョブ出力の既知セクション（表示順）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    InvalidDate,
    DuplicatesTx,
    UnbalancedTx,
    RequiredNulls,
}

impl SectionKind {
    pub const ALL: [SectionKind; 4] = [
        Self::InvalidDate,
        Self::DuplicatesTx,
        Self::UnbalancedTx,
        Self::RequiredNulls,
    ];

    /// JSON 上のキー
    pub fn key(&self) -> &'static str {
        match self {
            Self::InvalidDate => "invalid_date",
            Self::DuplicatesTx => "duplicates_tx",
            Self::UnbalancedTx => "unbalanced_tx",
            Self::RequiredNulls => "required_nulls",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::InvalidDate => "Fechas inválidas",
            Self::DuplicatesTx => "Duplicados (tx_id)",
            Self::UnbalancedTx => "Desbalances",
            Self::RequiredNulls => "Obligatorios nulos",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::InvalidDate => "🗓️",
            Self::DuplicatesTx => "🔁",
            Self::UnbalancedTx => "⚖️",
            Self::RequiredNulls => "❗",
        }
    }
}

fn zero() -> serde_json::Value {
    serde_json::Value::from(0)
}

/// 1セクション分の件数と例示アイテム。
/// 件数はノートブックが出した値をそのまま保持する（`3.0` や `null` もありうる）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    #[serde(default = "zero")]
    pub count: serde_json::Value,
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
}

impl Default for Section {
    fn default() -> Self {
        Self {
            count: zero(),
            items: vec![],
        }
    }
}

/// ジョブ出力の構造化サマリー。未知のキーは無視する。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditSummary {
    #[serde(default = "zero")]
    pub rows: serde_json::Value,
    #[serde(default)]
    pub invalid_date: Option<Section>,
    #[serde(default)]
    pub duplicates_tx: Option<Section>,
    #[serde(default)]
    pub unbalanced_tx: Option<Section>,
    #[serde(default)]
    pub required_nulls: Option<Section>,
}

impl Default for AuditSummary {
    fn default() -> Self {
        Self {
            rows: zero(),
            invalid_date: None,
            duplicates_tx: None,
            unbalanced_tx: None,
            required_nulls: None,
        }
    }
}

impl AuditSummary {
    pub fn section(&self, kind: SectionKind) -> Option<&Section> {
        match kind {
            SectionKind::InvalidDate => self.invalid_date.as_ref(),
            SectionKind::DuplicatesTx => self.duplicates_tx.as_ref(),
            SectionKind::UnbalancedTx => self.unbalanced_tx.as_ref(),
            SectionKind::RequiredNulls => self.required_nulls.as_ref(),
        }
    }

    /// 各セクションの例示アイテムを上限まで切り詰める
    pub fn truncate_items(&mut self) {
        for section in [
            &mut self.invalid_date,
            &mut self.duplicates_tx,
            &mut self.unbalanced_tx,
            &mut self.required_nulls,
        ]
        .into_iter()
        .flatten()
        {
            section.items.truncate(MAX_SECTION_ITEMS);
        }
    }
}
