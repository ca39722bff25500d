//! 原料需求計算
//!
//! 將計劃項目逐一展開為葉物料需求，跨項目以（物料, 倉庫）聚合後
//! 走採購管線：庫存淨需求 -> 最小訂購量 -> 安全庫存 -> 採購單位換算
//! （整數單位無條件進位）。

use std::collections::BTreeMap;

use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bom_calc::ExplosionEngine;
use bom_core::{
    BomDocument, BomError, BomRepository, ProductSource, Result, StockSource, UomSource,
};

use crate::aggregator::{PlanOptions, ProductionPlanItem};

/// 原料需求（一筆待請購的物料）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialRequirement {
    /// 物料代碼
    pub product_code: String,

    /// 請購倉庫
    pub warehouse: Option<String>,

    /// 請購單位（物料主檔採購單位，未設定時為庫存單位）
    pub uom: String,

    /// 請購數量（請購單位）
    pub quantity: Decimal,

    /// 淨需求（庫存單位，已套用管線）
    pub stock_required_qty: Decimal,

    /// 計算時的預計可用量
    pub projected_qty: Decimal,
}

/// 原料需求計算器
pub struct MaterialPlanner<'a> {
    repo: &'a (dyn BomRepository + Sync),
    products: &'a (dyn ProductSource + Sync),
    stock: &'a (dyn StockSource + Sync),
    uoms: &'a (dyn UomSource + Sync),
}

impl<'a> MaterialPlanner<'a> {
    /// 創建新的計算器
    pub fn new(
        repo: &'a (dyn BomRepository + Sync),
        products: &'a (dyn ProductSource + Sync),
        stock: &'a (dyn StockSource + Sync),
        uoms: &'a (dyn UomSource + Sync),
    ) -> Self {
        Self {
            repo,
            products,
            stock,
            uoms,
        }
    }

    /// 計算全部計劃項目的原料需求
    ///
    /// 展開逐項並行，聚合與採購管線循序；輸出依物料代碼排序
    pub fn material_requirements(
        &self,
        items: &[ProductionPlanItem],
        options: &PlanOptions,
    ) -> Result<Vec<MaterialRequirement>> {
        let nested: Vec<Vec<(String, Option<String>, Decimal, String)>> = items
            .par_iter()
            .map(|item| self.explode_item(item, options))
            .collect::<Result<_>>()?;

        // (物料, 倉庫) -> (需求量, 庫存單位)
        let mut demand: BTreeMap<(String, Option<String>), (Decimal, String)> = BTreeMap::new();
        for (product_code, warehouse, qty, stock_uom) in nested.into_iter().flatten() {
            let entry = demand
                .entry((product_code, warehouse))
                .or_insert((Decimal::ZERO, stock_uom));
            entry.0 += qty;
        }
        tracing::debug!(
            "原料需求: {} 個計劃項目 -> {} 筆聚合需求",
            items.len(),
            demand.len()
        );

        let mut requirements = Vec::with_capacity(demand.len());
        for ((product_code, warehouse), (required, stock_uom)) in demand {
            if let Some(requirement) =
                self.purchase_pipeline(&product_code, warehouse, required, stock_uom, options)?
            {
                requirements.push(requirement);
            }
        }
        Ok(requirements)
    }

    /// 展開單一計劃項目為葉物料需求
    fn explode_item(
        &self,
        item: &ProductionPlanItem,
        options: &PlanOptions,
    ) -> Result<Vec<(String, Option<String>, Decimal, String)>> {
        let bom = self.resolve_bom(item)?;
        let engine = ExplosionEngine::new(self.repo);
        let exploded = engine.explode_document(&bom)?;

        // 展開列為每批需求，換算為計劃數量
        let scale = item.planned_qty / bom.quantity;

        Ok(exploded
            .into_values()
            .map(|row| {
                // 呼叫端指定的倉庫優先，其次展開列來源倉庫、物料預設倉庫
                let warehouse = options
                    .warehouse
                    .clone()
                    .or_else(|| row.source_warehouse.clone())
                    .or_else(|| self.products.default_warehouse(&row.product_code));
                (
                    row.product_code,
                    warehouse,
                    row.stock_qty * scale,
                    row.stock_uom,
                )
            })
            .collect())
    }

    /// 採購管線：淨需求 -> 最小訂購量 -> 安全庫存 -> 採購單位換算
    ///
    /// 可用量足以涵蓋需求時回傳 None（不請購）
    fn purchase_pipeline(
        &self,
        product_code: &str,
        warehouse: Option<String>,
        required: Decimal,
        stock_uom: String,
        options: &PlanOptions,
    ) -> Result<Option<MaterialRequirement>> {
        let projected = match (options.skip_available_stock, warehouse.as_deref()) {
            (true, Some(warehouse)) => self.stock.projected_qty(product_code, warehouse),
            _ => Decimal::ZERO,
        };

        let mut net = required - projected.max(Decimal::ZERO);
        if net <= Decimal::ZERO {
            return Ok(None);
        }

        let min_order_qty = self.products.min_order_qty(product_code);
        if net < min_order_qty {
            net = min_order_qty;
        }

        net += self.products.safety_stock(product_code);

        let purchase_uom = self
            .products
            .purchase_uom(product_code)
            .unwrap_or_else(|| stock_uom.clone());

        let mut quantity = if purchase_uom == stock_uom {
            net
        } else {
            let factor = self
                .uoms
                .conversion_factor(product_code, &purchase_uom)
                .ok_or_else(|| {
                    BomError::Configuration(format!(
                        "物料 {} 缺少 {} 對庫存單位的換算係數",
                        product_code, purchase_uom
                    ))
                })?;
            net / factor
        };

        if self.uoms.is_whole_number(&purchase_uom) {
            quantity = quantity.ceil();
        }

        Ok(Some(MaterialRequirement {
            product_code: product_code.to_string(),
            warehouse,
            uom: purchase_uom,
            quantity,
            stock_required_qty: net,
            projected_qty: projected,
        }))
    }

    fn resolve_bom(&self, item: &ProductionPlanItem) -> Result<BomDocument> {
        match item.bom_no.as_deref() {
            Some(bom_no) => self.repo.get_bom(bom_no),
            None => self
                .repo
                .find_default_bom(&item.product_code)
                .ok_or_else(|| {
                    BomError::Configuration(format!(
                        "物料 {} 未指定 BOM 且沒有預設 BOM",
                        item.product_code
                    ))
                }),
        }
    }
}
