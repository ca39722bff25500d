//! 原料單價解析
//!
//! 依 BOM 的成本解析方法取得元件單價，各方法皆有備援鏈；
//! 查無單價時回傳 0 並產生警告工件，不中斷計算。

use rust_decimal::Decimal;

use bom_core::{
    BomComponentRow, BomDocument, BomError, CostingMethod, PriceListSource, ProductSource, Result,
    ValuationSource,
};

use crate::RateWarning;

/// 單價解析器
pub struct RateResolver<'a> {
    products: &'a dyn ProductSource,
    valuation: &'a dyn ValuationSource,
    price_lists: &'a dyn PriceListSource,
}

impl<'a> RateResolver<'a> {
    /// 創建新的解析器
    pub fn new(
        products: &'a dyn ProductSource,
        valuation: &'a dyn ValuationSource,
        price_lists: &'a dyn PriceListSource,
    ) -> Self {
        Self {
            products,
            valuation,
            price_lists,
        }
    }

    /// 解析元件列單價（BOM 幣別）
    ///
    /// * 客供料與供應商提供料件單價為 0
    /// * `sub_assembly_unit_cost` 有值時（子裝配單價取自 BOM），以其為準
    /// * 其餘依成本解析方法查價；查無時回傳 0 與警告
    ///
    /// 最終單價 = 原始單價 * plc_conversion_rate / conversion_rate
    pub fn resolve_component_rate(
        &self,
        bom: &BomDocument,
        row: &BomComponentRow,
        sub_assembly_unit_cost: Option<Decimal>,
    ) -> Result<(Decimal, Option<RateWarning>)> {
        if self.products.is_customer_provided(&row.product_code) || row.sourced_by_supplier {
            return Ok((Decimal::ZERO, None));
        }

        if let Some(unit_cost) = sub_assembly_unit_cost {
            let rate = unit_cost * row.conversion_factor;
            return Ok((self.scale(bom, rate), None));
        }

        let raw = match bom.costing_method {
            CostingMethod::ValuationRate => {
                self.valuation_rate(&row.product_code, &bom.company) * row.conversion_factor
            }
            CostingMethod::LastPurchaseRate => {
                let rate = self
                    .valuation
                    .last_purchase_rate(&row.product_code)
                    .or_else(|| self.products.last_purchase_rate(&row.product_code))
                    .unwrap_or(Decimal::ZERO);
                rate * row.conversion_factor
            }
            CostingMethod::PriceList => {
                let price_list = bom.buying_price_list.as_deref().ok_or_else(|| {
                    BomError::Configuration(format!(
                        "BOM {} 採用價目表成本法，必須指定採購價目表",
                        bom.id
                    ))
                })?;
                self.price_lists
                    .price_list_rate(&row.product_code, price_list, &row.uom, row.qty)
                    .unwrap_or(Decimal::ZERO)
            }
        };

        let warning = if raw == Decimal::ZERO {
            Some(self.unpriced_warning(bom, row))
        } else {
            None
        };

        Ok((self.scale(bom, raw), warning))
    }

    /// 估價備援鏈：倉庫加權平均 -> 最近一筆正估價 -> 物料主檔估價
    pub fn valuation_rate(&self, product_code: &str, company: &str) -> Decimal {
        let average = self.valuation.average_valuation_rate(product_code, company);

        if let Some(rate) = average {
            if rate > Decimal::ZERO {
                return rate;
            }
        }

        if let Some(rate) = self.valuation.last_positive_valuation_rate(product_code) {
            return rate;
        }

        self.products
            .valuation_rate(product_code)
            .unwrap_or(Decimal::ZERO)
    }

    fn scale(&self, bom: &BomDocument, rate: Decimal) -> Decimal {
        let conversion_rate = if bom.conversion_rate > Decimal::ZERO {
            bom.conversion_rate
        } else {
            Decimal::ONE
        };
        let plc = if bom.plc_conversion_rate > Decimal::ZERO {
            bom.plc_conversion_rate
        } else {
            Decimal::ONE
        };
        rate * plc / conversion_rate
    }

    fn unpriced_warning(&self, bom: &BomDocument, row: &BomComponentRow) -> RateWarning {
        let message = match bom.costing_method {
            CostingMethod::PriceList => format!(
                "價目表 {} 中找不到物料 {} 的單價",
                bom.buying_price_list.as_deref().unwrap_or(""),
                row.product_code
            ),
            CostingMethod::ValuationRate => {
                format!("找不到物料 {} 的估價", row.product_code)
            }
            CostingMethod::LastPurchaseRate => {
                format!("找不到物料 {} 的最近採購價", row.product_code)
            }
        };
        RateWarning::warning(row.product_code.clone(), message)
    }
}
