//! BOM 元件列模型

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// BOM 元件列（原料或子裝配）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BomComponentRow {
    /// 列ID
    pub id: Uuid,

    /// 物料代碼
    pub product_code: String,

    /// 每批用量（交易單位）
    pub qty: Decimal,

    /// 交易單位
    pub uom: String,

    /// 庫存單位
    pub stock_uom: String,

    /// 交易單位轉庫存單位的換算係數
    pub conversion_factor: Decimal,

    /// 每批用量（庫存單位）= qty * conversion_factor
    pub stock_qty: Decimal,

    /// 子裝配 BOM 編號（若此元件本身由 BOM 生產）
    pub bom_no: Option<String>,

    /// 不展開：視為葉節點，即使 bom_no 有值
    pub do_not_explode: bool,

    /// 由供應商提供（委外料件，成本為零）
    pub sourced_by_supplier: bool,

    /// 是否納入製造（移轉至工單）
    pub include_in_manufacturing: bool,

    /// 來源倉庫
    pub source_warehouse: Option<String>,

    /// 解析後單價（BOM 幣別）
    pub rate: Decimal,

    /// 解析後單價（公司幣別）
    pub base_rate: Decimal,

    /// 金額 = rate * qty
    pub amount: Decimal,

    /// 金額（公司幣別）
    pub base_amount: Decimal,

    /// 生產一單位成品所需數量 = stock_qty / bom.quantity
    pub qty_consumed_per_unit: Decimal,
}

impl BomComponentRow {
    /// 創建新的元件列（預設交易單位即庫存單位）
    pub fn new(product_code: impl Into<String>, qty: Decimal) -> Self {
        let product_code = product_code.into();
        Self {
            id: Uuid::new_v4(),
            product_code,
            qty,
            uom: "Nos".to_string(),
            stock_uom: "Nos".to_string(),
            conversion_factor: Decimal::ONE,
            stock_qty: qty,
            bom_no: None,
            do_not_explode: false,
            sourced_by_supplier: false,
            include_in_manufacturing: true,
            source_warehouse: None,
            rate: Decimal::ZERO,
            base_rate: Decimal::ZERO,
            amount: Decimal::ZERO,
            base_amount: Decimal::ZERO,
            qty_consumed_per_unit: Decimal::ZERO,
        }
    }

    /// 建構器模式：設置子裝配 BOM
    pub fn with_bom_no(mut self, bom_no: impl Into<String>) -> Self {
        self.bom_no = Some(bom_no.into());
        self
    }

    /// 建構器模式：設置單位與換算係數
    pub fn with_uom(
        mut self,
        uom: impl Into<String>,
        stock_uom: impl Into<String>,
        conversion_factor: Decimal,
    ) -> Self {
        self.uom = uom.into();
        self.stock_uom = stock_uom.into();
        self.conversion_factor = conversion_factor;
        self.update_stock_qty();
        self
    }

    /// 建構器模式：設置不展開
    pub fn with_do_not_explode(mut self, do_not_explode: bool) -> Self {
        self.do_not_explode = do_not_explode;
        self
    }

    /// 建構器模式：設置供應商提供
    pub fn with_sourced_by_supplier(mut self, sourced: bool) -> Self {
        self.sourced_by_supplier = sourced;
        self
    }

    /// 建構器模式：設置來源倉庫
    pub fn with_source_warehouse(mut self, warehouse: impl Into<String>) -> Self {
        self.source_warehouse = Some(warehouse.into());
        self
    }

    /// 重算庫存單位用量
    pub fn update_stock_qty(&mut self) {
        self.stock_qty = self.qty * self.conversion_factor;
    }

    /// 展開時實際使用的子 BOM（do_not_explode 時抑制）
    pub fn effective_bom_no(&self) -> Option<&str> {
        if self.do_not_explode {
            None
        } else {
            self.bom_no.as_deref()
        }
    }

    /// 是否為可展開的子裝配列
    pub fn is_expandable(&self) -> bool {
        self.effective_bom_no().is_some()
    }
}

/// BOM 報廢列（製程產出的副產品/廢料，成本自總成本扣除）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BomScrapRow {
    /// 列ID
    pub id: Uuid,

    /// 物料代碼
    pub product_code: String,

    /// 庫存單位
    pub stock_uom: String,

    /// 每批產出數量（庫存單位）
    pub stock_qty: Decimal,

    /// 估價單價（一律以估價法解析）
    pub rate: Decimal,

    /// 單價（公司幣別）
    pub base_rate: Decimal,

    /// 金額 = rate * stock_qty
    pub amount: Decimal,

    /// 金額（公司幣別）
    pub base_amount: Decimal,
}

impl BomScrapRow {
    /// 創建新的報廢列
    pub fn new(product_code: impl Into<String>, stock_qty: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_code: product_code.into(),
            stock_uom: "Nos".to_string(),
            stock_qty,
            rate: Decimal::ZERO,
            base_rate: Decimal::ZERO,
            amount: Decimal::ZERO,
            base_amount: Decimal::ZERO,
        }
    }

    /// 建構器模式：設置庫存單位
    pub fn with_stock_uom(mut self, uom: impl Into<String>) -> Self {
        self.stock_uom = uom.into();
        self
    }
}
