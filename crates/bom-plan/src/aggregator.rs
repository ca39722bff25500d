//! 子裝配需求聚合
//!
//! 自生產計劃項目沿 BOM 樹向下收集子裝配需求，
//! 輸出依 BOM 層級由深至淺排序（先造深層件，淺層件才有料可用）。

use std::collections::HashMap;

use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bom_core::{BomDocument, BomError, BomRepository, ProductSource, Result, StockSource};

/// 生產計劃項目（一筆要生產的成品）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionPlanItem {
    /// 成品物料代碼
    pub product_code: String,

    /// 指定 BOM（未指定時取該物料的預設 BOM）
    pub bom_no: Option<String>,

    /// 計劃生產數量（庫存單位）
    pub planned_qty: Decimal,

    /// 成品倉庫
    pub warehouse: Option<String>,
}

impl ProductionPlanItem {
    /// 創建新的計劃項目
    pub fn new(product_code: impl Into<String>, planned_qty: Decimal) -> Self {
        Self {
            product_code: product_code.into(),
            bom_no: None,
            planned_qty,
            warehouse: None,
        }
    }

    /// 建構器模式:指定 BOM
    pub fn with_bom_no(mut self, bom_no: impl Into<String>) -> Self {
        self.bom_no = Some(bom_no.into());
        self
    }

    /// 建構器模式:指定倉庫
    pub fn with_warehouse(mut self, warehouse: impl Into<String>) -> Self {
        self.warehouse = Some(warehouse.into());
        self
    }
}

/// 計劃選項
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// 以預計可用量抵減需求（足量時整個子樹不排產）
    pub skip_available_stock: bool,

    /// 合併相同的子裝配需求（同物料/倉庫/BOM/製造方式）
    pub combine_sub_assemblies: bool,

    /// 供料倉庫（列/主檔皆未指定倉庫時的備援）
    pub warehouse: Option<String>,
}

impl PlanOptions {
    /// 創建預設選項
    pub fn new() -> Self {
        Self::default()
    }

    /// 建構器模式:啟用庫存抵減
    pub fn with_skip_available_stock(mut self, flag: bool) -> Self {
        self.skip_available_stock = flag;
        self
    }

    /// 建構器模式:啟用合併
    pub fn with_combine_sub_assemblies(mut self, flag: bool) -> Self {
        self.combine_sub_assemblies = flag;
        self
    }

    /// 建構器模式:設置供料倉庫
    pub fn with_warehouse(mut self, warehouse: impl Into<String>) -> Self {
        self.warehouse = Some(warehouse.into());
        self
    }
}

/// 製造方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ManufacturingMode {
    /// 自製（開工單）
    InHouse,
    /// 委外（開委外採購單）
    Subcontract,
}

/// 子裝配需求（一張待開立的工單/委外單）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAssemblyRequirement {
    /// 子裝配物料代碼
    pub production_product: String,

    /// 上層物料代碼
    pub parent_product: String,

    /// 子裝配 BOM 編號
    pub bom_no: String,

    /// BOM 層級（成品的直接子裝配為 1，越深越大）
    pub bom_level: u32,

    /// 需求數量（庫存單位，已抵減可用量）
    pub required_qty: Decimal,

    /// 庫存單位
    pub stock_uom: String,

    /// 完工入庫倉庫
    pub warehouse: Option<String>,

    /// 製造方式
    pub manufacturing_mode: ManufacturingMode,
}

/// 子裝配需求聚合器
pub struct ProductionAggregator<'a> {
    repo: &'a (dyn BomRepository + Sync),
    products: &'a (dyn ProductSource + Sync),
    stock: &'a (dyn StockSource + Sync),
}

impl<'a> ProductionAggregator<'a> {
    /// 創建新的聚合器
    pub fn new(
        repo: &'a (dyn BomRepository + Sync),
        products: &'a (dyn ProductSource + Sync),
        stock: &'a (dyn StockSource + Sync),
    ) -> Self {
        Self {
            repo,
            products,
            stock,
        }
    }

    /// 收集全部計劃項目的子裝配需求
    ///
    /// 計劃項目間彼此獨立，並行收集後合併；
    /// 輸出依 bom_level 由深至淺、同層依物料代碼排序。
    pub fn sub_assembly_requirements(
        &self,
        items: &[ProductionPlanItem],
        options: &PlanOptions,
    ) -> Result<Vec<SubAssemblyRequirement>> {
        let nested: Vec<Vec<SubAssemblyRequirement>> = items
            .par_iter()
            .map(|item| self.collect_for_item(item, options))
            .collect::<Result<_>>()?;

        let mut requirements: Vec<SubAssemblyRequirement> = nested.into_iter().flatten().collect();
        tracing::debug!(
            "子裝配聚合: {} 個計劃項目 -> {} 筆需求",
            items.len(),
            requirements.len()
        );

        if options.combine_sub_assemblies {
            requirements = Self::combine(requirements);
        }

        requirements.sort_by(|a, b| {
            b.bom_level
                .cmp(&a.bom_level)
                .then_with(|| a.production_product.cmp(&b.production_product))
        });
        Ok(requirements)
    }

    /// 取得計劃項目使用的 BOM（指定優先，否則取預設）
    pub fn resolve_bom(&self, item: &ProductionPlanItem) -> Result<BomDocument> {
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

    fn collect_for_item(
        &self,
        item: &ProductionPlanItem,
        options: &PlanOptions,
    ) -> Result<Vec<SubAssemblyRequirement>> {
        let bom = self.resolve_bom(item)?;
        let mut out = Vec::new();
        self.descend(&bom, item.planned_qty, 1, options, &mut out)?;
        Ok(out)
    }

    /// 沿 BOM 樹向下收集帶 BOM 的元件列
    ///
    /// parent_qty 為上層需求量（庫存單位）；
    /// 足量抵減時整個子樹跳過，部分抵減時以淨需求續探
    fn descend(
        &self,
        bom: &BomDocument,
        parent_qty: Decimal,
        level: u32,
        options: &PlanOptions,
        out: &mut Vec<SubAssemblyRequirement>,
    ) -> Result<()> {
        // 批量為 0 的 BOM 不可進入任何計算
        if bom.quantity <= Decimal::ZERO {
            return Err(BomError::Validation(format!(
                "BOM {} 的產出數量必須大於 0",
                bom.id
            )));
        }

        for row in &bom.components {
            let Some(child_bom_id) = row.effective_bom_no() else {
                continue;
            };

            let mut required = parent_qty * row.stock_qty / bom.quantity;
            // 呼叫端指定的倉庫優先，其次元件列來源倉庫、物料預設倉庫
            let warehouse = options
                .warehouse
                .clone()
                .or_else(|| row.source_warehouse.clone())
                .or_else(|| self.products.default_warehouse(&row.product_code));

            if options.skip_available_stock {
                if let Some(warehouse) = warehouse.as_deref() {
                    let projected = self.stock.projected_qty(&row.product_code, warehouse);
                    if projected >= required {
                        continue;
                    }
                    if projected > Decimal::ZERO {
                        required -= projected;
                    }
                }
            }

            let manufacturing_mode = if row.sourced_by_supplier
                || self.products.is_subcontracted(&row.product_code)
            {
                ManufacturingMode::Subcontract
            } else {
                ManufacturingMode::InHouse
            };

            out.push(SubAssemblyRequirement {
                production_product: row.product_code.clone(),
                parent_product: bom.product_code.clone(),
                bom_no: child_bom_id.to_string(),
                bom_level: level,
                required_qty: required,
                stock_uom: row.stock_uom.clone(),
                warehouse,
                manufacturing_mode,
            });

            let child_bom = self.repo.get_bom(child_bom_id)?;
            self.descend(&child_bom, required, level + 1, options, out)?;
        }
        Ok(())
    }

    /// 合併相同鍵的需求：數量加總，層級取最深
    fn combine(requirements: Vec<SubAssemblyRequirement>) -> Vec<SubAssemblyRequirement> {
        type Key = (String, Option<String>, String, ManufacturingMode);
        let mut merged: HashMap<Key, SubAssemblyRequirement> = HashMap::new();

        for req in requirements {
            let key = (
                req.production_product.clone(),
                req.warehouse.clone(),
                req.bom_no.clone(),
                req.manufacturing_mode,
            );
            match merged.get_mut(&key) {
                Some(existing) => {
                    existing.required_qty += req.required_qty;
                    existing.bom_level = existing.bom_level.max(req.bom_level);
                }
                None => {
                    merged.insert(key, req);
                }
            }
        }

        merged.into_values().collect()
    }
}
