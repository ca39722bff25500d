//! BOM 成本計算與父項成本回溯
//!
//! 單張 BOM 成本 = 工序成本 + 原料成本 - 報廢回收，
//! 成本變動時沿 parent_bom_ids 向上重算（覆蓋層保證父項讀到新值）。
//! 引擎不寫回倉庫，重算後的文件由呼叫方持久化。

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bom_core::{
    BomDocument, BomRepository, PriceListSource, ProductSource, Result, ValuationSource,
};

use crate::explosion::{ExplodedRow, ExplosionEngine};
use crate::rates::RateResolver;
use crate::RateWarning;

/// 成本彙總（單張 BOM、每批）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostSummary {
    /// 工序成本（BOM 幣別）
    pub operating_cost: Decimal,
    /// 工序成本（公司幣別）
    pub base_operating_cost: Decimal,
    /// 原料成本（BOM 幣別）
    pub raw_material_cost: Decimal,
    /// 原料成本（公司幣別）
    pub base_raw_material_cost: Decimal,
    /// 報廢回收（BOM 幣別，自總成本扣除）
    pub scrap_material_cost: Decimal,
    /// 報廢回收（公司幣別）
    pub base_scrap_material_cost: Decimal,
    /// 總成本 = 工序 + 原料 - 報廢
    pub total_cost: Decimal,
    /// 總成本（公司幣別）
    pub base_total_cost: Decimal,
}

/// 元件列計價結果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowCost {
    /// 元件列ID
    pub row_id: Uuid,
    /// 物料代碼
    pub product_code: String,
    /// 單價（BOM 幣別）
    pub rate: Decimal,
    /// 單價（公司幣別）
    pub base_rate: Decimal,
    /// 金額（BOM 幣別）
    pub amount: Decimal,
    /// 金額（公司幣別）
    pub base_amount: Decimal,
}

/// 單張 BOM 的成本計算報告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostReport {
    /// 成本彙總
    pub summary: CostSummary,
    /// 元件列計價明細
    pub rows: Vec<RowCost>,
    /// 重算後的展開列（單價已重新蓋印）
    pub exploded: BTreeMap<String, ExplodedRow>,
    /// 計價警告（查無單價的物料）
    pub warnings: Vec<RateWarning>,
    /// 總成本是否與前次計算不同（髒標記，驅動父項回溯）
    pub cost_updated: bool,
    /// 前次計算的總成本（BOM 幣別）
    pub previous_total_cost: Decimal,
}

/// 成本回溯中單張 BOM 的重算結果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BomCostUpdate {
    /// BOM 編號
    pub bom_id: String,
    /// 前次總成本（BOM 幣別）
    pub previous_total_cost: Decimal,
    /// 新總成本（BOM 幣別）
    pub new_total_cost: Decimal,
    /// 是否變動
    pub cost_updated: bool,
    /// 重算後的完整文件（由呼叫方寫回）
    pub document: BomDocument,
    /// 重算後的展開列（由呼叫方寫回）
    pub exploded: BTreeMap<String, ExplodedRow>,
    /// 計價警告
    pub warnings: Vec<RateWarning>,
}

/// 回溯期間已重算 BOM 的快照
///
/// 父項計價讀 unit_costs，父項展開讀 exploded；
/// 兩者皆以本輪新值優先於倉庫中的前次計算值
#[derive(Debug, Default)]
struct CascadeOverlay {
    unit_costs: HashMap<String, Decimal>,
    exploded: HashMap<String, BTreeMap<String, ExplodedRow>>,
}

/// 成本計算器
pub struct CostCalculator<'a> {
    repo: &'a dyn BomRepository,
    products: &'a dyn ProductSource,
    valuation: &'a dyn ValuationSource,
    price_lists: &'a dyn PriceListSource,
}

impl<'a> CostCalculator<'a> {
    /// 創建新的計算器
    pub fn new(
        repo: &'a dyn BomRepository,
        products: &'a dyn ProductSource,
        valuation: &'a dyn ValuationSource,
        price_lists: &'a dyn PriceListSource,
    ) -> Self {
        Self {
            repo,
            products,
            valuation,
            price_lists,
        }
    }

    /// 重算單張 BOM 的成本（就地更新元件/工序/報廢列與總成本欄位）
    pub fn calculate_cost(&self, bom: &mut BomDocument) -> Result<CostReport> {
        self.calculate_with_overlay(bom, &CascadeOverlay::default())
    }

    /// 成本回溯：重算 bom_id，成本變動時沿父項鏈向上重算
    ///
    /// 覆蓋層保存本輪已重算的單位成本，父項計價以覆蓋層優先於
    /// 倉庫中的舊總成本；廣度優先保證父項處理時其子項皆已入層。
    /// 回傳順序即重算順序（子先父後）。
    pub fn update_cost_cascade(&self, bom_id: &str) -> Result<Vec<BomCostUpdate>> {
        let mut overlay = CascadeOverlay::default();
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        let mut updates = Vec::new();

        queue.push_back(bom_id.to_string());

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }

            let mut bom = self.repo.get_bom(&current)?;
            let report = self.calculate_with_overlay(&mut bom, &overlay)?;
            overlay.unit_costs.insert(current.clone(), bom.unit_cost());
            overlay
                .exploded
                .insert(current.clone(), report.exploded.clone());

            tracing::info!(
                "成本回溯: {} 總成本 {} -> {}{}",
                current,
                report.previous_total_cost,
                report.summary.total_cost,
                if report.cost_updated { "" } else { "（未變動）" },
            );

            if report.cost_updated {
                for parent in self.repo.parent_bom_ids(&current)? {
                    if !visited.contains(&parent) {
                        queue.push_back(parent);
                    }
                }
            }

            updates.push(BomCostUpdate {
                bom_id: current,
                previous_total_cost: report.previous_total_cost,
                new_total_cost: report.summary.total_cost,
                cost_updated: report.cost_updated,
                document: bom,
                exploded: report.exploded,
                warnings: report.warnings,
            });
        }

        Ok(updates)
    }

    fn calculate_with_overlay(
        &self,
        bom: &mut BomDocument,
        overlay: &CascadeOverlay,
    ) -> Result<CostReport> {
        let resolver = RateResolver::new(self.products, self.valuation, self.price_lists);
        let mut summary = CostSummary::default();
        let mut rows = Vec::with_capacity(bom.components.len());
        let mut warnings = Vec::new();

        // 工序成本
        if bom.with_operations {
            for op in &mut bom.operations {
                op.update_cost(bom.conversion_rate);
                let (cost, base_cost) = if op.set_cost_based_on_bom_qty {
                    // 依 BOM 批量計價而非依工序次數
                    (
                        op.cost_per_unit * bom.quantity,
                        op.base_cost_per_unit * bom.quantity,
                    )
                } else {
                    (op.operating_cost, op.base_operating_cost)
                };
                summary.operating_cost += cost;
                summary.base_operating_cost += base_cost;
            }
        } else if bom.fg_based_operating_cost {
            summary.operating_cost = bom.operating_cost_per_bom_quantity * bom.quantity;
            summary.base_operating_cost = summary.operating_cost * bom.conversion_rate;
        }

        // 原料成本：先對不可變文件解析單價，再寫回各列
        let mut resolved = Vec::with_capacity(bom.components.len());
        for row in &bom.components {
            let sub_assembly_unit_cost = match row.bom_no.as_deref() {
                Some(child_id) if bom.rate_of_sub_assembly_from_bom => {
                    Some(self.sub_assembly_unit_cost(child_id, overlay)?)
                }
                _ => None,
            };
            resolved.push(resolver.resolve_component_rate(bom, row, sub_assembly_unit_cost)?);
        }

        for (row, (rate, warning)) in bom.components.iter_mut().zip(resolved) {
            row.update_stock_qty();
            if let Some(warning) = warning {
                warnings.push(warning);
            }

            row.rate = rate;
            row.base_rate = rate * bom.conversion_rate;
            row.amount = rate * row.qty;
            row.base_amount = row.amount * bom.conversion_rate;
            row.qty_consumed_per_unit = row.stock_qty / bom.quantity;

            summary.raw_material_cost += row.amount;
            summary.base_raw_material_cost += row.base_amount;

            rows.push(RowCost {
                row_id: row.id,
                product_code: row.product_code.clone(),
                rate: row.rate,
                base_rate: row.base_rate,
                amount: row.amount,
                base_amount: row.base_amount,
            });
        }

        // 報廢回收（一律以估價法計價）
        for scrap in &mut bom.scrap_components {
            let base_rate = resolver.valuation_rate(&scrap.product_code, &bom.company);
            let conversion_rate = if bom.conversion_rate > Decimal::ZERO {
                bom.conversion_rate
            } else {
                Decimal::ONE
            };

            scrap.base_rate = base_rate;
            scrap.rate = base_rate / conversion_rate;
            scrap.amount = scrap.rate * scrap.stock_qty;
            scrap.base_amount = scrap.base_rate * scrap.stock_qty;

            summary.scrap_material_cost += scrap.amount;
            summary.base_scrap_material_cost += scrap.base_amount;
        }

        summary.total_cost =
            summary.operating_cost + summary.raw_material_cost - summary.scrap_material_cost;
        summary.base_total_cost = summary.base_operating_cost + summary.base_raw_material_cost
            - summary.base_scrap_material_cost;

        let previous_total_cost = bom.total_cost;
        let cost_updated = summary.total_cost != previous_total_cost;
        bom.total_cost = summary.total_cost;
        bom.base_total_cost = summary.base_total_cost;

        // 展開列單價以重算後的元件列重新蓋印；
        // 子 BOM 的展開列優先取本輪重算結果
        let engine = ExplosionEngine::new(self.repo);
        let exploded = engine.explode_document_with(bom, &overlay.exploded)?;

        Ok(CostReport {
            summary,
            rows,
            exploded,
            warnings,
            cost_updated,
            previous_total_cost,
        })
    }

    /// 子裝配單位成本（公司幣別）：本輪覆蓋層優先，其次倉庫中的前次計算值
    fn sub_assembly_unit_cost(
        &self,
        child_bom_id: &str,
        overlay: &CascadeOverlay,
    ) -> Result<Decimal> {
        if let Some(unit_cost) = overlay.unit_costs.get(child_bom_id) {
            return Ok(*unit_cost);
        }
        Ok(self.repo.get_bom(child_bom_id)?.unit_cost())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bom_core::{
        BomComponentRow, BomDocument, BomOperationRow, BomScrapRow, InMemoryStore, ProductRecord,
    };

    fn priced_store() -> InMemoryStore {
        let mut store = InMemoryStore::new();
        store.add_product(ProductRecord::new("STEEL-TUBE").with_valuation_rate(Decimal::from(10)));
        store.add_product(ProductRecord::new("WHEEL").with_valuation_rate(Decimal::from(25)));
        store.add_product(ProductRecord::new("FRAME"));
        store.add_product(ProductRecord::new("BIKE"));
        store.add_product(ProductRecord::new("OFFCUT").with_valuation_rate(Decimal::from(2)));
        store
    }

    fn calculator(store: &InMemoryStore) -> CostCalculator<'_> {
        CostCalculator::new(store, store, store, store)
    }

    #[test]
    fn test_raw_material_cost() {
        let store = priced_store();
        let calc = calculator(&store);

        let mut bom = BomDocument::new("BOM-FRAME-001", "FRAME", Decimal::ONE)
            .with_component(BomComponentRow::new("STEEL-TUBE", Decimal::from(3)))
            .with_component(BomComponentRow::new("WHEEL", Decimal::from(2)));

        let report = calc.calculate_cost(&mut bom).unwrap();

        // 3 * 10 + 2 * 25 = 80
        assert_eq!(report.summary.raw_material_cost, Decimal::from(80));
        assert_eq!(report.summary.total_cost, Decimal::from(80));
        assert_eq!(bom.total_cost, Decimal::from(80));
        assert_eq!(bom.components[0].rate, Decimal::from(10));
        assert_eq!(bom.components[0].amount, Decimal::from(30));
        assert!(report.warnings.is_empty());
        assert!(report.cost_updated);
    }

    #[test]
    fn test_operation_cost_included() {
        let store = priced_store();
        let calc = calculator(&store);

        let mut bom = BomDocument::new("BOM-FRAME-001", "FRAME", Decimal::ONE)
            .with_component(BomComponentRow::new("STEEL-TUBE", Decimal::from(3)))
            // 30 分鐘 * 100/hr = 50
            .with_operation(BomOperationRow::new(
                "Welding",
                Decimal::from(30),
                Decimal::from(100),
            ));

        let report = calc.calculate_cost(&mut bom).unwrap();
        assert_eq!(report.summary.operating_cost, Decimal::from(50));
        assert_eq!(report.summary.total_cost, Decimal::from(80));
    }

    #[test]
    fn test_operation_cost_based_on_bom_qty() {
        let store = priced_store();
        let calc = calculator(&store);

        // 批量 10、依 BOM 批量計價：每單位 5，批量 20 -> 100
        let mut bom = BomDocument::new("BOM-FRAME-001", "FRAME", Decimal::from(20))
            .with_component(BomComponentRow::new("STEEL-TUBE", Decimal::from(60)))
            .with_operation(
                BomOperationRow::new("Painting", Decimal::from(30), Decimal::from(100))
                    .with_batch_size(Decimal::from(10))
                    .with_cost_based_on_bom_qty(true),
            );

        let report = calc.calculate_cost(&mut bom).unwrap();
        assert_eq!(report.summary.operating_cost, Decimal::from(100));
    }

    #[test]
    fn test_fg_based_operating_cost() {
        let store = priced_store();
        let calc = calculator(&store);

        let mut bom = BomDocument::new("BOM-FRAME-001", "FRAME", Decimal::from(4))
            .with_component(BomComponentRow::new("STEEL-TUBE", Decimal::from(12)))
            .with_fg_based_operating_cost(Decimal::from(7));

        let report = calc.calculate_cost(&mut bom).unwrap();
        // 4 * 7 = 28
        assert_eq!(report.summary.operating_cost, Decimal::from(28));
        assert_eq!(report.summary.total_cost, Decimal::from(120 + 28));
    }

    #[test]
    fn test_scrap_deducted_from_total() {
        let store = priced_store();
        let calc = calculator(&store);

        let mut bom = BomDocument::new("BOM-FRAME-001", "FRAME", Decimal::ONE)
            .with_component(BomComponentRow::new("STEEL-TUBE", Decimal::from(3)))
            .with_scrap(BomScrapRow::new("OFFCUT", Decimal::from(5)));

        let report = calc.calculate_cost(&mut bom).unwrap();
        // 30 - 5 * 2 = 20
        assert_eq!(report.summary.scrap_material_cost, Decimal::from(10));
        assert_eq!(report.summary.total_cost, Decimal::from(20));
    }

    #[test]
    fn test_sub_assembly_rate_from_bom() {
        let mut store = priced_store();
        let mut child = BomDocument::new("BOM-FRAME-001", "FRAME", Decimal::from(2))
            .with_component(BomComponentRow::new("STEEL-TUBE", Decimal::from(6)));
        child.base_total_cost = Decimal::from(60);
        child.total_cost = Decimal::from(60);
        store.add_bom(child).unwrap();

        let calc = calculator(&store);
        let mut parent = BomDocument::new("BOM-BIKE-001", "BIKE", Decimal::ONE)
            .with_component(BomComponentRow::new("FRAME", Decimal::ONE).with_bom_no("BOM-FRAME-001"))
            .with_component(BomComponentRow::new("WHEEL", Decimal::from(2)))
            .with_rate_of_sub_assembly_from_bom(true);

        let report = calc.calculate_cost(&mut parent).unwrap();
        // 子裝配單位成本 60 / 2 = 30，加上輪子 2 * 25
        assert_eq!(parent.components[0].rate, Decimal::from(30));
        assert_eq!(report.summary.raw_material_cost, Decimal::from(80));
    }

    #[test]
    fn test_idempotent_recalculation() {
        let store = priced_store();
        let calc = calculator(&store);

        let mut bom = BomDocument::new("BOM-FRAME-001", "FRAME", Decimal::ONE)
            .with_component(BomComponentRow::new("STEEL-TUBE", Decimal::from(3)));

        let first = calc.calculate_cost(&mut bom).unwrap();
        assert!(first.cost_updated);

        // 輸入不變時重算不得再標記為變動
        let second = calc.calculate_cost(&mut bom).unwrap();
        assert!(!second.cost_updated);
        assert_eq!(second.summary.total_cost, first.summary.total_cost);
    }

    #[test]
    fn test_unpriced_component_warns_not_fails() {
        let mut store = priced_store();
        store.add_product(ProductRecord::new("MYSTERY"));
        let calc = calculator(&store);

        let mut bom = BomDocument::new("BOM-FRAME-001", "FRAME", Decimal::ONE)
            .with_component(BomComponentRow::new("STEEL-TUBE", Decimal::from(3)))
            .with_component(BomComponentRow::new("MYSTERY", Decimal::ONE));

        let report = calc.calculate_cost(&mut bom).unwrap();
        assert_eq!(report.summary.total_cost, Decimal::from(30));
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].product_code, "MYSTERY");
    }

    #[test]
    fn test_exploded_rows_restamped() {
        let mut store = priced_store();
        let mut child = BomDocument::new("BOM-FRAME-001", "FRAME", Decimal::ONE)
            .with_component(BomComponentRow::new("STEEL-TUBE", Decimal::from(3)));
        let calc_store = priced_store();
        let calc = calculator(&calc_store);
        calc.calculate_cost(&mut child).unwrap();
        store.add_bom(child).unwrap();

        let calc = calculator(&store);
        let mut parent = BomDocument::new("BOM-BIKE-001", "BIKE", Decimal::ONE)
            .with_component(BomComponentRow::new("FRAME", Decimal::ONE).with_bom_no("BOM-FRAME-001"))
            .with_component(BomComponentRow::new("WHEEL", Decimal::from(2)));
        let report = calc.calculate_cost(&mut parent).unwrap();

        assert_eq!(report.exploded["STEEL-TUBE"].stock_qty, Decimal::from(3));
        assert_eq!(report.exploded["STEEL-TUBE"].rate, Decimal::from(10));
        assert_eq!(report.exploded["WHEEL"].rate, Decimal::from(25));
        assert_eq!(report.exploded["WHEEL"].amount, Decimal::from(50));
    }

    #[test]
    fn test_cascade_recomputes_parents_with_fresh_child_cost() {
        let mut store = priced_store();

        // 子 BOM 帶過期的總成本（估價已自 8 漲至 10）
        let mut child = BomDocument::new("BOM-FRAME-001", "FRAME", Decimal::ONE)
            .with_component(BomComponentRow::new("STEEL-TUBE", Decimal::from(3)));
        child.total_cost = Decimal::from(24);
        child.base_total_cost = Decimal::from(24);
        child.submit().unwrap();
        store.add_bom(child).unwrap();

        let mut parent = BomDocument::new("BOM-BIKE-001", "BIKE", Decimal::ONE)
            .with_component(BomComponentRow::new("FRAME", Decimal::ONE).with_bom_no("BOM-FRAME-001"))
            .with_rate_of_sub_assembly_from_bom(true);
        parent.total_cost = Decimal::from(24);
        parent.base_total_cost = Decimal::from(24);
        parent.submit().unwrap();
        store.add_bom(parent).unwrap();

        let calc = calculator(&store);
        let updates = calc.update_cost_cascade("BOM-FRAME-001").unwrap();

        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].bom_id, "BOM-FRAME-001");
        assert_eq!(updates[0].new_total_cost, Decimal::from(30));
        assert!(updates[0].cost_updated);

        // 父項必須以覆蓋層中的新單位成本 30 計價，而非倉庫中的 24
        assert_eq!(updates[1].bom_id, "BOM-BIKE-001");
        assert_eq!(updates[1].new_total_cost, Decimal::from(30));
        assert_eq!(updates[1].document.components[0].rate, Decimal::from(30));
    }

    #[test]
    fn test_cascade_restamps_exploded_rates_from_fresh_child() {
        let mut store = priced_store();

        // 子 BOM 的列在倉庫中帶著過期的零單價
        let mut child = BomDocument::new("BOM-FRAME-001", "FRAME", Decimal::ONE)
            .with_component(BomComponentRow::new("STEEL-TUBE", Decimal::from(3)));
        child.submit().unwrap();
        store.add_bom(child).unwrap();

        let mut parent = BomDocument::new("BOM-BIKE-001", "BIKE", Decimal::ONE)
            .with_component(
                BomComponentRow::new("FRAME", Decimal::ONE).with_bom_no("BOM-FRAME-001"),
            )
            .with_rate_of_sub_assembly_from_bom(true);
        parent.submit().unwrap();
        store.add_bom(parent).unwrap();

        let calc = calculator(&store);
        let updates = calc.update_cost_cascade("BOM-FRAME-001").unwrap();
        assert_eq!(updates.len(), 2);

        // 子項展開列帶本輪解析的估價
        assert_eq!(updates[0].exploded["STEEL-TUBE"].rate, Decimal::from(10));

        // 父項展開列必須蓋上本輪重算的子列單價，而非倉庫中的零值
        assert_eq!(updates[1].bom_id, "BOM-BIKE-001");
        assert_eq!(updates[1].exploded["STEEL-TUBE"].rate, Decimal::from(10));
        assert_eq!(
            updates[1].exploded["STEEL-TUBE"].stock_qty,
            Decimal::from(3)
        );
        assert_eq!(
            updates[1].exploded["STEEL-TUBE"].amount,
            Decimal::from(30)
        );
    }

    #[test]
    fn test_cascade_stops_when_cost_unchanged() {
        let mut store = priced_store();

        let mut child = BomDocument::new("BOM-FRAME-001", "FRAME", Decimal::ONE)
            .with_component(BomComponentRow::new("STEEL-TUBE", Decimal::from(3)));
        child.total_cost = Decimal::from(30);
        child.base_total_cost = Decimal::from(30);
        child.submit().unwrap();
        store.add_bom(child).unwrap();

        let mut parent = BomDocument::new("BOM-BIKE-001", "BIKE", Decimal::ONE)
            .with_component(
                BomComponentRow::new("FRAME", Decimal::ONE).with_bom_no("BOM-FRAME-001"),
            );
        parent.submit().unwrap();
        store.add_bom(parent).unwrap();

        let calc = calculator(&store);
        let updates = calc.update_cost_cascade("BOM-FRAME-001").unwrap();

        // 子項成本未變，父項不重算
        assert_eq!(updates.len(), 1);
        assert!(!updates[0].cost_updated);
    }
}
