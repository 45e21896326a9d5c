use crate::domain::summary::{AuditSummary, Section, SectionKind, MAX_SECTION_ITEMS};
use crate::domain::types::{AuditRecord, Summary};

/// 履歴一覧でテキストサマリーを切り詰める文字数
const HEADLINE_MAX_CHARS: usize = 120;

/// 整形エラー
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("Malformed result: {0}")]
    Malformed(String),
}

/// ジョブ出力の整形: JSON 解析 → 箇条書きレンダリング
pub struct ResultFormatter;

impl ResultFormatter {
    /// 生の出力を構造化サマリーと表示用テキストに変換する
    pub fn format(raw: &str) -> Result<(AuditSummary, String), FormatError> {
        let summary = Self::parse(raw)?;
        let rendering = Self::render(&summary);
        Ok((summary, rendering))
    }

    /// JSON オブジェクトとして解析し、例示アイテムを上限まで切り詰める
    pub fn parse(raw: &str) -> Result<AuditSummary, FormatError> {
        let value: serde_json::Value = serde_json::from_str(raw.trim())
            .map_err(|e| FormatError::Malformed(e.to_string()))?;
        if !value.is_object() {
            return Err(FormatError::Malformed(
                "top-level value is not an object".to_string(),
            ));
        }
        let mut summary: AuditSummary =
            serde_json::from_value(value).map_err(|e| FormatError::Malformed(e.to_string()))?;
        summary.truncate_items();
        Ok(summary)
    }

    /// 決定的なレンダリング。同じ入力からは常に同じバイト列を返す。
    pub fn render(summary: &AuditSummary) -> String {
        let mut lines = vec![
            "📊 *Auditoría contable*".to_string(),
            format!("Total de filas: {}", display_value(Some(&summary.rows))),
        ];

        for kind in SectionKind::ALL {
            let empty = Section::default();
            let section = summary.section(kind).unwrap_or(&empty);
            lines.push(format!(
                "{} *{}*: *{}*",
                kind.emoji(),
                kind.title(),
                display_value(Some(&section.count))
            ));
            for item in section.items.iter().take(MAX_SECTION_ITEMS) {
                lines.push(render_item(kind, item));
            }
        }

        lines.join("\n")
    }

    /// 履歴一覧（/audits）
    pub fn render_history(records: &[AuditRecord]) -> String {
        if records.is_empty() {
            return "No hay auditorías registradas aún.".to_string();
        }

        let blocks: Vec<String> = records
            .iter()
            .map(|r| {
                format!(
                    "#{} · {} · {}\n  {}\n  {}",
                    r.id,
                    r.file_name,
                    r.created_at.format("%Y-%m-%d %H:%M:%S"),
                    headline(&r.summary),
                    r.run_url.as_deref().unwrap_or("")
                )
            })
            .collect();

        format!("Últimas auditorías:\n\n{}", blocks.join("\n"))
    }
}

fn render_item(kind: SectionKind, item: &serde_json::Value) -> String {
    let field = |name: &str| display_value(item.get(name));
    match kind {
        SectionKind::UnbalancedTx => format!(
            "  • tx `{}` — debit={} credit={} diff={}  _{}_",
            field("tx_id"),
            field("sum_debit"),
            field("sum_credit"),
            field("diff"),
            field("suggestion")
        ),
        _ => format!(
            "  • fila {} tx `{}` — {}  _{}_",
            field("row"),
            field("tx_id"),
            field("reason"),
            field("suggestion")
        ),
    }
}

fn display_value(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => "-".to_string(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// 一覧の見出し: 構造化なら件数、テキストなら先頭 120 文字
fn headline(summary: &Summary) -> String {
    match summary {
        Summary::Structured(value) if value.is_object() => {
            let count = |key: &str| display_value(value.get(key).and_then(|s| s.get("count")));
            format!(
                "invalid_date={}, duplicates={}, unbalanced={}, required_nulls={}",
                count("invalid_date"),
                count("duplicates_tx"),
                count("unbalanced_tx"),
                count("required_nulls")
            )
        }
        Summary::Structured(value) => truncate(&value.to_string()),
        Summary::Text(text) => truncate(text),
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() > HEADLINE_MAX_CHARS {
        let head: String = text.chars().take(HEADLINE_MAX_CHARS).collect();
        format!("{head}…")
    } else {
        text.to_string()
    }
}
