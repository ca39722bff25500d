//! 多層 BOM 展開
//!
//! 將多層 BOM 壓平為單層原料需求列，重複物料跨子裝配加總。
//! 以 BTreeMap 依物料代碼排序輸出，展開結果可重現（供差異比對/快照）。

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bom_core::{BomDocument, BomError, BomRepository, Result};

/// 展開列（壓平後的原料需求）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplodedRow {
    /// 物料代碼
    pub product_code: String,

    /// 庫存單位
    pub stock_uom: String,

    /// 每批累計需求量（庫存單位）
    pub stock_qty: Decimal,

    /// 單價（公司幣別，每庫存單位；合併時保留首見值）
    pub rate: Decimal,

    /// 金額 = stock_qty * rate
    pub amount: Decimal,

    /// 來源倉庫（首見值）
    pub source_warehouse: Option<String>,

    /// 是否納入製造（首見值）
    pub include_in_manufacturing: bool,

    /// 由供應商提供（首見值）
    pub sourced_by_supplier: bool,

    /// 生產一單位成品所需數量 = stock_qty / root_bom.quantity
    pub qty_consumed_per_unit: Decimal,
}

/// 展開引擎
pub struct ExplosionEngine<'a> {
    repo: &'a dyn BomRepository,
}

impl<'a> ExplosionEngine<'a> {
    /// 創建新的引擎
    pub fn new(repo: &'a dyn BomRepository) -> Self {
        Self { repo }
    }

    /// 展開 BOM 為原料需求列（以物料代碼為鍵，數量為一批產出所需）
    pub fn explode(&self, bom_id: &str) -> Result<BTreeMap<String, ExplodedRow>> {
        let bom = self.repo.get_bom(bom_id)?;
        self.explode_document(&bom)
    }

    /// 展開記憶體中的 BOM 文件（子 BOM 仍自倉庫讀取）
    ///
    /// 成本重算時文件尚未寫回倉庫，展開必須以重算後的列為準
    pub fn explode_document(&self, bom: &BomDocument) -> Result<BTreeMap<String, ExplodedRow>> {
        self.explode_document_with(bom, &HashMap::new())
    }

    /// 展開文件，子 BOM 優先採用本輪已計算的展開列
    ///
    /// 成本回溯期間，倉庫中的子 BOM 列仍是舊單價；
    /// `computed` 提供已重算 BOM 的展開結果，父項展開以其為準
    pub fn explode_document_with(
        &self,
        bom: &BomDocument,
        computed: &HashMap<String, BTreeMap<String, ExplodedRow>>,
    ) -> Result<BTreeMap<String, ExplodedRow>> {
        Self::ensure_explodable(bom)?;
        tracing::debug!("展開 BOM: {} ({} 列)", bom.id, bom.components.len());

        let mut accumulator: BTreeMap<String, ExplodedRow> = BTreeMap::new();

        for row in &bom.components {
            match row.effective_bom_no() {
                Some(child_bom_id) => {
                    let child_bom = self.repo.get_bom(child_bom_id)?;
                    Self::ensure_explodable(&child_bom)?;
                    let child_rows = match computed.get(child_bom_id) {
                        Some(rows) => rows.clone(),
                        None => self.explode_document_with(&child_bom, computed)?,
                    };
                    // 以子 BOM 的已壓平結果縮放，不用 qty_consumed_per_unit 以免捨入損失
                    let scale = row.stock_qty / child_bom.quantity;

                    for (product_code, child_row) in child_rows {
                        let scaled_qty = child_row.stock_qty * scale;
                        Self::merge(
                            &mut accumulator,
                            product_code,
                            scaled_qty,
                            &child_row.stock_uom,
                            child_row.rate,
                            child_row.source_warehouse.as_deref(),
                            child_row.include_in_manufacturing,
                            child_row.sourced_by_supplier,
                        );
                    }
                }
                None => {
                    // 每庫存單位的公司幣別單價
                    let rate = if row.conversion_factor > Decimal::ZERO {
                        row.base_rate / row.conversion_factor
                    } else {
                        row.base_rate
                    };
                    Self::merge(
                        &mut accumulator,
                        row.product_code.clone(),
                        row.stock_qty,
                        &row.stock_uom,
                        rate,
                        row.source_warehouse.as_deref(),
                        row.include_in_manufacturing,
                        row.sourced_by_supplier,
                    );
                }
            }
        }

        for exploded in accumulator.values_mut() {
            exploded.qty_consumed_per_unit = exploded.stock_qty / bom.quantity;
            exploded.amount = exploded.stock_qty * exploded.rate;
        }

        Ok(accumulator)
    }

    /// 產出數量為 0 的 BOM 不可進入任何計算
    fn ensure_explodable(bom: &BomDocument) -> Result<()> {
        if bom.quantity <= Decimal::ZERO {
            return Err(BomError::Validation(format!(
                "BOM {} 的產出數量必須大於 0",
                bom.id
            )));
        }
        Ok(())
    }

    /// 合併到累加器：數量加總，其餘欄位保留首見值
    fn merge(
        accumulator: &mut BTreeMap<String, ExplodedRow>,
        product_code: String,
        stock_qty: Decimal,
        stock_uom: &str,
        rate: Decimal,
        source_warehouse: Option<&str>,
        include_in_manufacturing: bool,
        sourced_by_supplier: bool,
    ) {
        match accumulator.get_mut(&product_code) {
            Some(existing) => {
                existing.stock_qty += stock_qty;
            }
            None => {
                accumulator.insert(
                    product_code.clone(),
                    ExplodedRow {
                        product_code,
                        stock_uom: stock_uom.to_string(),
                        stock_qty,
                        rate,
                        amount: Decimal::ZERO,
                        source_warehouse: source_warehouse.map(str::to_string),
                        include_in_manufacturing,
                        sourced_by_supplier,
                        qty_consumed_per_unit: Decimal::ZERO,
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bom_core::{BomComponentRow, BomDocument, InMemoryStore};
    use bom_graph::TreeBuilder;
    use proptest::prelude::*;

    /// Assembly 範例（規格情境 1）：
    ///   ASSEMBLY
    ///     └── SUB-1 x1（BOM-SUB-001）
    ///           ├── PART-1 x2
    ///           └── PART-2 x3
    fn assembly_store() -> InMemoryStore {
        let mut store = InMemoryStore::new();
        store
            .add_bom(
                BomDocument::new("BOM-SUB-001", "SUB-1", Decimal::ONE)
                    .with_component(BomComponentRow::new("PART-1", Decimal::from(2)))
                    .with_component(BomComponentRow::new("PART-2", Decimal::from(3))),
            )
            .unwrap();
        store
            .add_bom(
                BomDocument::new("BOM-ASSY-001", "ASSEMBLY", Decimal::ONE).with_component(
                    BomComponentRow::new("SUB-1", Decimal::ONE).with_bom_no("BOM-SUB-001"),
                ),
            )
            .unwrap();
        store
    }

    #[test]
    fn test_exploded_quantities() {
        let store = assembly_store();
        let engine = ExplosionEngine::new(&store);
        let rows = engine.explode("BOM-ASSY-001").unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows["PART-1"].stock_qty, Decimal::from(2));
        assert_eq!(rows["PART-2"].stock_qty, Decimal::from(3));

        // 需求 5 批 -> PART-1: 10, PART-2: 15
        let for_five: Vec<Decimal> = rows
            .values()
            .map(|r| r.stock_qty * Decimal::from(5))
            .collect();
        assert_eq!(for_five, vec![Decimal::from(10), Decimal::from(15)]);
    }

    #[test]
    fn test_repeated_component_summed() {
        let mut store = InMemoryStore::new();
        // SUB 與頂層都使用 BOLT
        store
            .add_bom(
                BomDocument::new("BOM-SUB-001", "SUB", Decimal::ONE)
                    .with_component(BomComponentRow::new("BOLT", Decimal::from(4))),
            )
            .unwrap();
        store
            .add_bom(
                BomDocument::new("BOM-TOP-001", "TOP", Decimal::ONE)
                    .with_component(
                        BomComponentRow::new("SUB", Decimal::from(2)).with_bom_no("BOM-SUB-001"),
                    )
                    .with_component(BomComponentRow::new("BOLT", Decimal::from(3))),
            )
            .unwrap();

        let engine = ExplosionEngine::new(&store);
        let rows = engine.explode("BOM-TOP-001").unwrap();

        // 2 * 4 + 3 = 11
        assert_eq!(rows["BOLT"].stock_qty, Decimal::from(11));
    }

    #[test]
    fn test_batch_quantity_scaling() {
        let mut store = InMemoryStore::new();
        // 子 BOM 一批產 10 個，用 20 個 RIVET -> 每單位 2 個
        store
            .add_bom(
                BomDocument::new("BOM-PANEL-001", "PANEL", Decimal::from(10))
                    .with_component(BomComponentRow::new("RIVET", Decimal::from(20))),
            )
            .unwrap();
        store
            .add_bom(
                BomDocument::new("BOM-DOOR-001", "DOOR", Decimal::ONE).with_component(
                    BomComponentRow::new("PANEL", Decimal::from(3)).with_bom_no("BOM-PANEL-001"),
                ),
            )
            .unwrap();

        let engine = ExplosionEngine::new(&store);
        let rows = engine.explode("BOM-DOOR-001").unwrap();
        assert_eq!(rows["RIVET"].stock_qty, Decimal::from(6));
        assert_eq!(rows["RIVET"].qty_consumed_per_unit, Decimal::from(6));
    }

    #[test]
    fn test_first_seen_metadata_preserved() {
        let mut store = InMemoryStore::new();
        let mut first = BomComponentRow::new("BOLT", Decimal::from(4));
        first.source_warehouse = Some("WH-A".to_string());
        first.base_rate = Decimal::from(5);
        store
            .add_bom(BomDocument::new("BOM-SUB-001", "SUB", Decimal::ONE).with_component(first))
            .unwrap();

        let mut second = BomComponentRow::new("BOLT", Decimal::from(3));
        second.source_warehouse = Some("WH-B".to_string());
        second.base_rate = Decimal::from(9);
        store
            .add_bom(
                BomDocument::new("BOM-TOP-001", "TOP", Decimal::ONE)
                    .with_component(
                        BomComponentRow::new("SUB", Decimal::ONE).with_bom_no("BOM-SUB-001"),
                    )
                    .with_component(second),
            )
            .unwrap();

        let engine = ExplosionEngine::new(&store);
        let rows = engine.explode("BOM-TOP-001").unwrap();

        // 首見（來自子 BOM 展開）的倉庫與單價不被後續合併覆寫
        assert_eq!(rows["BOLT"].source_warehouse.as_deref(), Some("WH-A"));
        assert_eq!(rows["BOLT"].rate, Decimal::from(5));
        assert_eq!(rows["BOLT"].stock_qty, Decimal::from(7));
    }

    #[test]
    fn test_output_sorted_by_product_code() {
        let mut store = InMemoryStore::new();
        store
            .add_bom(
                BomDocument::new("BOM-TOP-001", "TOP", Decimal::ONE)
                    .with_component(BomComponentRow::new("ZINC", Decimal::ONE))
                    .with_component(BomComponentRow::new("ALUMINIUM", Decimal::ONE))
                    .with_component(BomComponentRow::new("COPPER", Decimal::ONE)),
            )
            .unwrap();

        let engine = ExplosionEngine::new(&store);
        let rows = engine.explode("BOM-TOP-001").unwrap();
        let codes: Vec<&str> = rows.keys().map(String::as_str).collect();
        assert_eq!(codes, vec!["ALUMINIUM", "COPPER", "ZINC"]);
    }

    #[test]
    fn test_zero_quantity_bom_rejected() {
        // 批量為 0 的 BOM 必須在展開前被擋下，不得進入除法
        let mut store = InMemoryStore::new();
        store
            .add_bom(
                BomDocument::new("BOM-BAD-001", "BAD", Decimal::ZERO)
                    .with_component(BomComponentRow::new("PART", Decimal::ONE)),
            )
            .unwrap();

        let engine = ExplosionEngine::new(&store);
        assert!(matches!(
            engine.explode("BOM-BAD-001"),
            Err(BomError::Validation(_))
        ));
    }

    #[test]
    fn test_zero_quantity_child_rejected() {
        let mut store = InMemoryStore::new();
        store
            .add_bom(
                BomDocument::new("BOM-SUB-001", "SUB", Decimal::ZERO)
                    .with_component(BomComponentRow::new("PART", Decimal::ONE)),
            )
            .unwrap();
        store
            .add_bom(
                BomDocument::new("BOM-TOP-001", "TOP", Decimal::ONE).with_component(
                    BomComponentRow::new("SUB", Decimal::ONE).with_bom_no("BOM-SUB-001"),
                ),
            )
            .unwrap();

        let engine = ExplosionEngine::new(&store);
        assert!(matches!(
            engine.explode("BOM-TOP-001"),
            Err(BomError::Validation(_))
        ));
    }

    #[test]
    fn test_explosion_agrees_with_tree_walk() {
        // 展開與樹走訪必須對葉物料總量達成一致
        let store = assembly_store();
        let engine = ExplosionEngine::new(&store);
        let rows = engine.explode("BOM-ASSY-001").unwrap();

        let builder = TreeBuilder::new(&store, &store);
        let tree = builder.build("BOM-ASSY-001").unwrap();
        let leaves = tree.leaf_quantities();

        for (code, leaf_qty) in &leaves {
            assert_eq!(rows[code].stock_qty, *leaf_qty, "物料 {} 數量不一致", code);
        }
    }

    proptest! {
        /// 展開總量不變式：任意兩層無循環 BOM，
        /// 展開引擎與樹走訪計得的葉物料總量一致
        #[test]
        fn prop_explosion_sum_invariant(
            sub_qtys in proptest::collection::vec(1u32..50, 1..4),
            use_qtys in proptest::collection::vec(1u32..10, 1..4),
            top_qty in 1u32..20,
        ) {
            let mut store = InMemoryStore::new();

            let mut sub = BomDocument::new("BOM-SUB-001", "SUB", Decimal::ONE);
            for (i, qty) in sub_qtys.iter().enumerate() {
                sub = sub.with_component(BomComponentRow::new(
                    format!("PART-{i}"),
                    Decimal::from(*qty),
                ));
            }
            store.add_bom(sub).unwrap();

            let mut top = BomDocument::new("BOM-TOP-001", "TOP", Decimal::from(top_qty));
            for (i, qty) in use_qtys.iter().enumerate() {
                if i == 0 {
                    top = top.with_component(
                        BomComponentRow::new("SUB", Decimal::from(*qty))
                            .with_bom_no("BOM-SUB-001"),
                    );
                } else {
                    top = top.with_component(BomComponentRow::new(
                        format!("RAW-{i}"),
                        Decimal::from(*qty),
                    ));
                }
            }
            store.add_bom(top).unwrap();

            let engine = ExplosionEngine::new(&store);
            let rows = engine.explode("BOM-TOP-001").unwrap();

            let builder = TreeBuilder::new(&store, &store);
            let tree = builder.build("BOM-TOP-001").unwrap();

            // 樹走訪以每單位計，展開以每批計：樹走訪 * 批量 = 展開
            for (code, leaf_qty) in tree.leaf_quantities() {
                prop_assert_eq!(
                    rows[&code].stock_qty,
                    leaf_qty * Decimal::from(top_qty)
                );
            }
        }
    }
}
