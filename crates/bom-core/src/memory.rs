//! 記憶體資料庫
//!
//! 所有資料來源介面的參考實作，供測試、範例與嵌入端使用。
//! 引擎計算期間視其為不可變快照；寫入（add_*）由宿主在計算之外進行。

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::document::BomDocument;
use crate::sources::{
    BinDetails, BomRepository, PriceListSource, ProductSource, StockSource, UomSource,
    ValuationSource,
};
use crate::{BomError, Result};

/// 物料主檔紀錄
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRecord {
    /// 物料代碼
    pub product_code: String,
    /// 物料名稱
    pub product_name: String,
    /// 庫存單位
    pub stock_uom: String,
    /// 主檔估價
    pub valuation_rate: Option<Decimal>,
    /// 主檔快取的最近採購價
    pub last_purchase_rate: Option<Decimal>,
    /// 客供料
    pub is_customer_provided: bool,
    /// 委外加工
    pub is_subcontracted: bool,
    /// 變體所屬模板
    pub variant_of: Option<String>,
    /// 採購單位
    pub purchase_uom: Option<String>,
    /// 最小訂購量
    pub min_order_qty: Decimal,
    /// 安全庫存
    pub safety_stock: Decimal,
    /// 預設倉庫
    pub default_warehouse: Option<String>,
}

impl ProductRecord {
    /// 創建新的物料紀錄
    pub fn new(product_code: impl Into<String>) -> Self {
        let product_code = product_code.into();
        Self {
            product_name: product_code.clone(),
            product_code,
            stock_uom: "Nos".to_string(),
            valuation_rate: None,
            last_purchase_rate: None,
            is_customer_provided: false,
            is_subcontracted: false,
            variant_of: None,
            purchase_uom: None,
            min_order_qty: Decimal::ZERO,
            safety_stock: Decimal::ZERO,
            default_warehouse: None,
        }
    }

    /// 建構器模式：設置主檔估價
    pub fn with_valuation_rate(mut self, rate: Decimal) -> Self {
        self.valuation_rate = Some(rate);
        self
    }

    /// 建構器模式：設置最近採購價
    pub fn with_last_purchase_rate(mut self, rate: Decimal) -> Self {
        self.last_purchase_rate = Some(rate);
        self
    }

    /// 建構器模式：設置客供料
    pub fn with_customer_provided(mut self, flag: bool) -> Self {
        self.is_customer_provided = flag;
        self
    }

    /// 建構器模式：設置委外加工
    pub fn with_subcontracted(mut self, flag: bool) -> Self {
        self.is_subcontracted = flag;
        self
    }

    /// 建構器模式：設置變體模板
    pub fn with_variant_of(mut self, template: impl Into<String>) -> Self {
        self.variant_of = Some(template.into());
        self
    }

    /// 建構器模式：設置採購單位
    pub fn with_purchase_uom(mut self, uom: impl Into<String>) -> Self {
        self.purchase_uom = Some(uom.into());
        self
    }

    /// 建構器模式：設置最小訂購量
    pub fn with_min_order_qty(mut self, qty: Decimal) -> Self {
        self.min_order_qty = qty;
        self
    }

    /// 建構器模式：設置安全庫存
    pub fn with_safety_stock(mut self, qty: Decimal) -> Self {
        self.safety_stock = qty;
        self
    }

    /// 建構器模式：設置預設倉庫
    pub fn with_default_warehouse(mut self, warehouse: impl Into<String>) -> Self {
        self.default_warehouse = Some(warehouse.into());
        self
    }
}

/// 庫存帳紀錄（估價歷史）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// 物料代碼
    pub product_code: String,
    /// 過帳日期
    pub posting_date: NaiveDate,
    /// 當時估價
    pub valuation_rate: Decimal,
}

/// 單位定義
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UomRecord {
    /// 單位名稱
    pub name: String,
    /// 限定整數
    pub must_be_whole_number: bool,
}

/// 倉儲格位（內部紀錄，含公司與庫存價值）
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BinRecord {
    warehouse: String,
    company: String,
    actual_qty: Decimal,
    stock_value: Decimal,
    ordered_qty: Decimal,
    reserved_qty: Decimal,
    projected_qty: Decimal,
}

/// 記憶體資料庫
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    boms: HashMap<String, BomDocument>,
    products: HashMap<String, ProductRecord>,
    bins: HashMap<String, Vec<BinRecord>>,
    ledger: Vec<LedgerEntry>,
    purchases: Vec<(String, NaiveDate, Decimal)>,
    price_lists: HashMap<(String, String), Decimal>,
    uoms: HashMap<String, UomRecord>,
    uom_factors: HashMap<(String, String), Decimal>,
}

impl InMemoryStore {
    /// 創建空的資料庫
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入 BOM
    ///
    /// 同一物料的啟用 BOM 中最多一張可設為預設
    pub fn add_bom(&mut self, bom: BomDocument) -> Result<()> {
        if bom.is_default && bom.is_active {
            let conflicting = self.boms.values().any(|existing| {
                existing.product_code == bom.product_code
                    && existing.is_default
                    && existing.is_active
                    && existing.id != bom.id
            });
            if conflicting {
                return Err(BomError::Validation(format!(
                    "物料 {} 已存在預設 BOM，{} 不可再設為預設",
                    bom.product_code, bom.id
                )));
            }
        }

        self.boms.insert(bom.id.clone(), bom);
        Ok(())
    }

    /// 加入物料主檔
    pub fn add_product(&mut self, product: ProductRecord) {
        self.products.insert(product.product_code.clone(), product);
    }

    /// 加入格位庫存
    pub fn add_bin(
        &mut self,
        product_code: impl Into<String>,
        warehouse: impl Into<String>,
        company: impl Into<String>,
        actual_qty: Decimal,
        stock_value: Decimal,
        projected_qty: Decimal,
    ) {
        self.bins
            .entry(product_code.into())
            .or_default()
            .push(BinRecord {
                warehouse: warehouse.into(),
                company: company.into(),
                actual_qty,
                stock_value,
                ordered_qty: Decimal::ZERO,
                reserved_qty: Decimal::ZERO,
                projected_qty,
            });
    }

    /// 加入庫存帳紀錄
    pub fn add_ledger_entry(
        &mut self,
        product_code: impl Into<String>,
        posting_date: NaiveDate,
        valuation_rate: Decimal,
    ) {
        self.ledger.push(LedgerEntry {
            product_code: product_code.into(),
            posting_date,
            valuation_rate,
        });
    }

    /// 加入採購紀錄
    pub fn add_purchase(
        &mut self,
        product_code: impl Into<String>,
        posting_date: NaiveDate,
        rate: Decimal,
    ) {
        self.purchases.push((product_code.into(), posting_date, rate));
    }

    /// 加入價目表單價
    pub fn add_price(
        &mut self,
        price_list: impl Into<String>,
        product_code: impl Into<String>,
        rate: Decimal,
    ) {
        self.price_lists
            .insert((price_list.into(), product_code.into()), rate);
    }

    /// 加入單位定義
    pub fn add_uom(&mut self, name: impl Into<String>, must_be_whole_number: bool) {
        let name = name.into();
        self.uoms.insert(
            name.clone(),
            UomRecord {
                name,
                must_be_whole_number,
            },
        );
    }

    /// 加入物料的單位換算係數
    pub fn add_uom_factor(
        &mut self,
        product_code: impl Into<String>,
        uom: impl Into<String>,
        factor: Decimal,
    ) {
        self.uom_factors
            .insert((product_code.into(), uom.into()), factor);
    }

    /// 取得可變的 BOM（宿主套用成本更新時使用）
    pub fn bom_mut(&mut self, id: &str) -> Option<&mut BomDocument> {
        self.boms.get_mut(id)
    }

    /// 已登錄的 BOM 數量
    pub fn bom_count(&self) -> usize {
        self.boms.len()
    }
}

impl BomRepository for InMemoryStore {
    fn get_bom(&self, id: &str) -> Result<BomDocument> {
        self.boms
            .get(id)
            .cloned()
            .ok_or_else(|| BomError::BomNotFound(id.to_string()))
    }

    fn find_default_bom(&self, product_code: &str) -> Option<BomDocument> {
        self.boms
            .values()
            .find(|bom| bom.product_code == product_code && bom.is_default && bom.is_active)
            .cloned()
    }

    fn direct_child_bom_ids(&self, id: &str) -> Result<Vec<String>> {
        let bom = self
            .boms
            .get(id)
            .ok_or_else(|| BomError::BomNotFound(id.to_string()))?;

        Ok(bom
            .components
            .iter()
            .filter_map(|row| row.bom_no.clone())
            .collect())
    }

    fn parent_bom_ids(&self, id: &str) -> Result<Vec<String>> {
        let mut parents: Vec<String> = self
            .boms
            .values()
            .filter(|bom| {
                bom.is_usable()
                    && bom
                        .components
                        .iter()
                        .any(|row| row.bom_no.as_deref() == Some(id))
            })
            .map(|bom| bom.id.clone())
            .collect();

        // 固定輸出順序，讓回溯結果可重現
        parents.sort();
        Ok(parents)
    }
}

impl ProductSource for InMemoryStore {
    fn exists(&self, product_code: &str) -> bool {
        self.products.contains_key(product_code)
    }

    fn variant_of(&self, product_code: &str) -> Option<String> {
        self.products.get(product_code)?.variant_of.clone()
    }

    fn is_customer_provided(&self, product_code: &str) -> bool {
        self.products
            .get(product_code)
            .map(|p| p.is_customer_provided)
            .unwrap_or(false)
    }

    fn is_subcontracted(&self, product_code: &str) -> bool {
        self.products
            .get(product_code)
            .map(|p| p.is_subcontracted)
            .unwrap_or(false)
    }

    fn valuation_rate(&self, product_code: &str) -> Option<Decimal> {
        self.products.get(product_code)?.valuation_rate
    }

    fn last_purchase_rate(&self, product_code: &str) -> Option<Decimal> {
        self.products.get(product_code)?.last_purchase_rate
    }

    fn purchase_uom(&self, product_code: &str) -> Option<String> {
        self.products.get(product_code)?.purchase_uom.clone()
    }

    fn min_order_qty(&self, product_code: &str) -> Decimal {
        self.products
            .get(product_code)
            .map(|p| p.min_order_qty)
            .unwrap_or(Decimal::ZERO)
    }

    fn safety_stock(&self, product_code: &str) -> Decimal {
        self.products
            .get(product_code)
            .map(|p| p.safety_stock)
            .unwrap_or(Decimal::ZERO)
    }

    fn default_warehouse(&self, product_code: &str) -> Option<String> {
        self.products.get(product_code)?.default_warehouse.clone()
    }
}

impl ValuationSource for InMemoryStore {
    fn average_valuation_rate(&self, product_code: &str, company: &str) -> Option<Decimal> {
        let bins = self.bins.get(product_code)?;

        let mut total_qty = Decimal::ZERO;
        let mut total_value = Decimal::ZERO;
        let mut found = false;
        for bin in bins.iter().filter(|b| b.company == company) {
            found = true;
            total_qty += bin.actual_qty;
            total_value += bin.stock_value;
        }

        if !found || total_qty == Decimal::ZERO {
            return None;
        }
        Some(total_value / total_qty)
    }

    fn last_positive_valuation_rate(&self, product_code: &str) -> Option<Decimal> {
        self.ledger
            .iter()
            .filter(|e| e.product_code == product_code && e.valuation_rate > Decimal::ZERO)
            .max_by_key(|e| e.posting_date)
            .map(|e| e.valuation_rate)
    }

    fn last_purchase_rate(&self, product_code: &str) -> Option<Decimal> {
        self.purchases
            .iter()
            .filter(|(code, _, _)| code == product_code)
            .max_by_key(|(_, date, _)| *date)
            .map(|(_, _, rate)| *rate)
    }
}

impl PriceListSource for InMemoryStore {
    fn price_list_rate(
        &self,
        product_code: &str,
        price_list: &str,
        _uom: &str,
        _qty: Decimal,
    ) -> Option<Decimal> {
        self.price_lists
            .get(&(price_list.to_string(), product_code.to_string()))
            .copied()
    }
}

impl StockSource for InMemoryStore {
    fn projected_qty(&self, product_code: &str, warehouse: &str) -> Decimal {
        self.bins
            .get(product_code)
            .and_then(|bins| bins.iter().find(|b| b.warehouse == warehouse))
            .map(|b| b.projected_qty)
            .unwrap_or(Decimal::ZERO)
    }

    fn bin_details(&self, product_code: &str, warehouse: &str) -> BinDetails {
        self.bins
            .get(product_code)
            .and_then(|bins| bins.iter().find(|b| b.warehouse == warehouse))
            .map(|b| BinDetails {
                actual_qty: b.actual_qty,
                ordered_qty: b.ordered_qty,
                reserved_qty: b.reserved_qty,
                projected_qty: b.projected_qty,
            })
            .unwrap_or_default()
    }
}

impl UomSource for InMemoryStore {
    fn conversion_factor(&self, product_code: &str, uom: &str) -> Option<Decimal> {
        self.uom_factors
            .get(&(product_code.to_string(), uom.to_string()))
            .copied()
    }

    fn is_whole_number(&self, uom: &str) -> bool {
        self.uoms
            .get(uom)
            .map(|u| u.must_be_whole_number)
            .unwrap_or(false)
    }
}
