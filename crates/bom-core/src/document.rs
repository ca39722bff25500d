//! BOM 文件模型與生命週期

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::component::{BomComponentRow, BomScrapRow};
use crate::operation::BomOperationRow;
use crate::{BomError, Result};

/// 文件狀態（生命週期狀態機）
///
/// Draft -> Submitted -> Cancelled，宿主系統透過 submit/cancel 顯式觸發轉換
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocStatus {
    /// 草稿
    Draft,
    /// 已提交
    Submitted,
    /// 已取消
    Cancelled,
}

/// 原料成本解析方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CostingMethod {
    /// 估價法：倉庫加權平均 -> 最近一筆正估價 -> 物料主檔估價
    ValuationRate,
    /// 最近採購價：最近採購紀錄 -> 物料主檔快取
    LastPurchaseRate,
    /// 價目表：指定採購價目表查價
    PriceList,
}

/// BOM 文件（一張製造配方）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BomDocument {
    /// BOM 編號
    pub id: String,

    /// 產出物料代碼
    pub product_code: String,

    /// 每批產出數量
    pub quantity: Decimal,

    /// 產出單位
    pub uom: String,

    /// 幣別
    pub currency: String,

    /// 轉公司幣別匯率
    pub conversion_rate: Decimal,

    /// 價目表幣別轉公司幣別匯率（估價法/最近採購價固定為 1）
    pub plc_conversion_rate: Decimal,

    /// 公司
    pub company: String,

    /// 是否啟用
    pub is_active: bool,

    /// 是否為該物料的預設 BOM
    pub is_default: bool,

    /// 原料成本解析方法
    pub costing_method: CostingMethod,

    /// 採購價目表（價目表法必填）
    pub buying_price_list: Option<String>,

    /// 是否含工序
    pub with_operations: bool,

    /// 依成品數量計算作業成本（無工序時的替代方案）
    pub fg_based_operating_cost: bool,

    /// 每 BOM 批量的作業成本（fg_based_operating_cost 時使用）
    pub operating_cost_per_bom_quantity: Decimal,

    /// 子裝配列的單價取自其 BOM 單位成本（而非查價）
    pub rate_of_sub_assembly_from_bom: bool,

    /// 製程損耗百分比（僅影響計劃數量，不影響成本）
    pub process_loss_percentage: Decimal,

    /// 前次計算的總成本（髒標記比較基準）
    pub total_cost: Decimal,

    /// 前次計算的總成本（公司幣別）
    pub base_total_cost: Decimal,

    /// 文件狀態
    pub status: DocStatus,

    /// 元件列
    pub components: Vec<BomComponentRow>,

    /// 工序列
    pub operations: Vec<BomOperationRow>,

    /// 報廢列
    pub scrap_components: Vec<BomScrapRow>,
}

impl BomDocument {
    /// 創建新的 BOM（草稿狀態）
    pub fn new(
        id: impl Into<String>,
        product_code: impl Into<String>,
        quantity: Decimal,
    ) -> Self {
        Self {
            id: id.into(),
            product_code: product_code.into(),
            quantity,
            uom: "Nos".to_string(),
            currency: "USD".to_string(),
            conversion_rate: Decimal::ONE,
            plc_conversion_rate: Decimal::ONE,
            company: "Default Company".to_string(),
            is_active: true,
            is_default: false,
            costing_method: CostingMethod::ValuationRate,
            buying_price_list: None,
            with_operations: false,
            fg_based_operating_cost: false,
            operating_cost_per_bom_quantity: Decimal::ZERO,
            rate_of_sub_assembly_from_bom: false,
            process_loss_percentage: Decimal::ZERO,
            total_cost: Decimal::ZERO,
            base_total_cost: Decimal::ZERO,
            status: DocStatus::Draft,
            components: Vec::new(),
            operations: Vec::new(),
            scrap_components: Vec::new(),
        }
    }

    /// 建構器模式：添加元件列
    pub fn with_component(mut self, row: BomComponentRow) -> Self {
        self.components.push(row);
        self
    }

    /// 建構器模式：添加工序列
    pub fn with_operation(mut self, row: BomOperationRow) -> Self {
        self.with_operations = true;
        self.operations.push(row);
        self
    }

    /// 建構器模式：添加報廢列
    pub fn with_scrap(mut self, row: BomScrapRow) -> Self {
        self.scrap_components.push(row);
        self
    }

    /// 建構器模式：設置成本解析方法
    pub fn with_costing_method(mut self, method: CostingMethod) -> Self {
        self.costing_method = method;
        self
    }

    /// 建構器模式：設置採購價目表
    pub fn with_buying_price_list(mut self, price_list: impl Into<String>) -> Self {
        self.buying_price_list = Some(price_list.into());
        self
    }

    /// 建構器模式：設置幣別與匯率
    pub fn with_currency(mut self, currency: impl Into<String>, conversion_rate: Decimal) -> Self {
        self.currency = currency.into();
        self.conversion_rate = conversion_rate;
        self
    }

    /// 建構器模式：設置預設旗標
    pub fn with_default(mut self, is_default: bool) -> Self {
        self.is_default = is_default;
        self
    }

    /// 建構器模式：設置子裝配單價取自 BOM
    pub fn with_rate_of_sub_assembly_from_bom(mut self, flag: bool) -> Self {
        self.rate_of_sub_assembly_from_bom = flag;
        self
    }

    /// 建構器模式：設置依成品數量的作業成本
    pub fn with_fg_based_operating_cost(mut self, cost_per_bom_quantity: Decimal) -> Self {
        self.fg_based_operating_cost = true;
        self.operating_cost_per_bom_quantity = cost_per_bom_quantity;
        self
    }

    /// 建構器模式：設置製程損耗百分比
    pub fn with_process_loss_percentage(mut self, percentage: Decimal) -> Self {
        self.process_loss_percentage = percentage;
        self
    }

    /// 驗證文件內容（提交前必須通過）
    pub fn validate(&self) -> Result<()> {
        if self.quantity <= Decimal::ZERO {
            return Err(BomError::Validation(format!(
                "BOM {} 的產出數量必須大於 0",
                self.id
            )));
        }

        if self.conversion_rate <= Decimal::ZERO {
            return Err(BomError::Validation(format!(
                "BOM {} 的匯率必須大於 0",
                self.id
            )));
        }

        if self.components.is_empty() {
            return Err(BomError::Validation(format!(
                "BOM {} 的原料列不可為空",
                self.id
            )));
        }

        for row in &self.components {
            if row.qty <= Decimal::ZERO {
                return Err(BomError::Validation(format!(
                    "BOM {} 元件 {} 的用量必須大於 0",
                    self.id, row.product_code
                )));
            }
            if row.conversion_factor <= Decimal::ZERO {
                return Err(BomError::Validation(format!(
                    "BOM {} 元件 {} 的單位換算係數必須大於 0",
                    self.id, row.product_code
                )));
            }
        }

        if self.costing_method == CostingMethod::PriceList && self.buying_price_list.is_none() {
            return Err(BomError::Configuration(format!(
                "BOM {} 採用價目表成本法，必須指定採購價目表",
                self.id
            )));
        }

        if self.process_loss_percentage > Decimal::ONE_HUNDRED {
            return Err(BomError::Validation(format!(
                "BOM {} 的製程損耗百分比不可大於 100",
                self.id
            )));
        }

        if self.with_operations && self.operations.is_empty() {
            return Err(BomError::Validation(format!(
                "BOM {} 標記含工序，工序列不可為空",
                self.id
            )));
        }

        Ok(())
    }

    /// 提交：Draft -> Submitted（先執行驗證）
    pub fn submit(&mut self) -> Result<()> {
        if self.status != DocStatus::Draft {
            return Err(BomError::InvalidTransition {
                from: self.status,
                to: DocStatus::Submitted,
            });
        }
        self.validate()?;
        self.status = DocStatus::Submitted;
        Ok(())
    }

    /// 取消：Submitted -> Cancelled，同時停用並取消預設
    pub fn cancel(&mut self) -> Result<()> {
        if self.status != DocStatus::Submitted {
            return Err(BomError::InvalidTransition {
                from: self.status,
                to: DocStatus::Cancelled,
            });
        }
        self.status = DocStatus::Cancelled;
        self.is_active = false;
        self.is_default = false;
        Ok(())
    }

    /// 是否已提交且啟用（可被其他 BOM 引用 / 參與成本回溯）
    pub fn is_usable(&self) -> bool {
        self.status == DocStatus::Submitted && self.is_active
    }

    /// 單位成本（公司幣別）= base_total_cost / quantity
    pub fn unit_cost(&self) -> Decimal {
        if self.quantity <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        self.base_total_cost / self.quantity
    }

    /// 製程損耗數量 = quantity * process_loss_percentage / 100
    pub fn process_loss_qty(&self) -> Decimal {
        self.quantity * self.process_loss_percentage / Decimal::ONE_HUNDRED
    }

    /// 驗證製程損耗：整數單位不可產生小數損耗量
    pub fn validate_process_loss(&self, uom_must_be_whole_number: bool) -> Result<()> {
        let loss_qty = self.process_loss_qty();
        if uom_must_be_whole_number && loss_qty != loss_qty.trunc() {
            return Err(BomError::Validation(format!(
                "物料 {} 的單位 {} 為整數單位，製程損耗量 {} 不可為小數",
                self.product_code, self.uom, loss_qty
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bom() -> BomDocument {
        BomDocument::new("BOM-BIKE-001", "BIKE", Decimal::ONE)
            .with_component(BomComponentRow::new("FRAME", Decimal::ONE))
            .with_component(BomComponentRow::new("WHEEL", Decimal::from(2)))
    }

    #[test]
    fn test_validate_ok() {
        assert!(sample_bom().validate().is_ok());
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let bom = BomDocument::new("BOM-X-001", "X", Decimal::ZERO)
            .with_component(BomComponentRow::new("Y", Decimal::ONE));
        assert!(matches!(bom.validate(), Err(BomError::Validation(_))));
    }

    #[test]
    fn test_zero_component_qty_rejected() {
        // 元件用量為 0 必須在任何計算前被擋下
        let bom = BomDocument::new("BOM-X-001", "X", Decimal::ONE)
            .with_component(BomComponentRow::new("Y", Decimal::ZERO));
        assert!(matches!(bom.validate(), Err(BomError::Validation(_))));
    }

    #[test]
    fn test_price_list_without_config_rejected() {
        let bom = sample_bom().with_costing_method(CostingMethod::PriceList);
        assert!(matches!(bom.validate(), Err(BomError::Configuration(_))));

        let bom = sample_bom()
            .with_costing_method(CostingMethod::PriceList)
            .with_buying_price_list("Standard Buying");
        assert!(bom.validate().is_ok());
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut bom = sample_bom();
        assert_eq!(bom.status, DocStatus::Draft);

        bom.submit().unwrap();
        assert_eq!(bom.status, DocStatus::Submitted);
        assert!(bom.is_usable());

        // 重複提交為非法轉換
        assert!(matches!(
            bom.submit(),
            Err(BomError::InvalidTransition { .. })
        ));

        bom.cancel().unwrap();
        assert_eq!(bom.status, DocStatus::Cancelled);
        assert!(!bom.is_active);
        assert!(!bom.is_default);
    }

    #[test]
    fn test_cancel_from_draft_rejected() {
        let mut bom = sample_bom();
        assert!(matches!(
            bom.cancel(),
            Err(BomError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_process_loss() {
        let bom = BomDocument::new("BOM-X-001", "X", Decimal::from(100))
            .with_component(BomComponentRow::new("Y", Decimal::ONE))
            .with_process_loss_percentage(Decimal::from(5));

        assert_eq!(bom.process_loss_qty(), Decimal::from(5));
        assert!(bom.validate_process_loss(true).is_ok());

        let bom = bom.with_process_loss_percentage(Decimal::from(3));
        // 100 * 3% = 3，整數單位 OK
        assert!(bom.validate_process_loss(true).is_ok());

        let bom = BomDocument::new("BOM-X-002", "X", Decimal::from(10))
            .with_component(BomComponentRow::new("Y", Decimal::ONE))
            .with_process_loss_percentage(Decimal::from(5));
        // 10 * 5% = 0.5，整數單位不允許
        assert!(bom.validate_process_loss(true).is_err());
        assert!(bom.validate_process_loss(false).is_ok());
    }

    #[test]
    fn test_process_loss_over_100_rejected() {
        let bom = sample_bom().with_process_loss_percentage(Decimal::from(101));
        assert!(bom.validate().is_err());
    }

    #[test]
    fn test_unit_cost() {
        let mut bom = sample_bom();
        bom.base_total_cost = Decimal::from(250);
        bom.quantity = Decimal::from(5);
        assert_eq!(bom.unit_cost(), Decimal::from(50));
    }
}
