//! BOM 工序列模型

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// BOM 工序列（製造步驟）
///
/// 單位成本 = 工時費率 * 時間(分) / 60 / 批量
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BomOperationRow {
    /// 列ID
    pub id: Uuid,

    /// 工序名稱
    pub operation: String,

    /// 工作站
    pub workstation: Option<String>,

    /// 作業時間（分鐘）
    pub time_in_mins: Decimal,

    /// 每小時費率（BOM 幣別）
    pub hour_rate: Decimal,

    /// 每小時費率（公司幣別）
    pub base_hour_rate: Decimal,

    /// 批量（一次工序可處理的數量）
    pub batch_size: Decimal,

    /// 工序成本 = hour_rate * time_in_mins / 60
    pub operating_cost: Decimal,

    /// 工序成本（公司幣別）
    pub base_operating_cost: Decimal,

    /// 單位成本 = operating_cost / batch_size
    pub cost_per_unit: Decimal,

    /// 單位成本（公司幣別）
    pub base_cost_per_unit: Decimal,

    /// 依 BOM 批量計算成本（而非依工序次數）
    pub set_cost_based_on_bom_qty: bool,
}

impl BomOperationRow {
    /// 創建新的工序列
    pub fn new(operation: impl Into<String>, time_in_mins: Decimal, hour_rate: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation: operation.into(),
            workstation: None,
            time_in_mins,
            hour_rate,
            base_hour_rate: Decimal::ZERO,
            batch_size: Decimal::ONE,
            operating_cost: Decimal::ZERO,
            base_operating_cost: Decimal::ZERO,
            cost_per_unit: Decimal::ZERO,
            base_cost_per_unit: Decimal::ZERO,
            set_cost_based_on_bom_qty: false,
        }
    }

    /// 建構器模式：設置工作站
    pub fn with_workstation(mut self, workstation: impl Into<String>) -> Self {
        self.workstation = Some(workstation.into());
        self
    }

    /// 建構器模式：設置批量
    pub fn with_batch_size(mut self, batch_size: Decimal) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// 建構器模式：設置依 BOM 批量計算
    pub fn with_cost_based_on_bom_qty(mut self, flag: bool) -> Self {
        self.set_cost_based_on_bom_qty = flag;
        self
    }

    /// 重算工序成本與單位成本
    ///
    /// 批量小於等於零時視為 1，避免除零
    pub fn update_cost(&mut self, conversion_rate: Decimal) {
        if self.batch_size <= Decimal::ZERO {
            self.batch_size = Decimal::ONE;
        }

        self.operating_cost = self.hour_rate * self.time_in_mins / Decimal::from(60);
        self.base_hour_rate = self.hour_rate * conversion_rate;
        self.base_operating_cost = self.operating_cost * conversion_rate;
        self.cost_per_unit = self.operating_cost / self.batch_size;
        self.base_cost_per_unit = self.base_operating_cost / self.batch_size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_cost() {
        // 30 分鐘 * 100/hr = 50
        let mut op = BomOperationRow::new("Assembly", Decimal::from(30), Decimal::from(100));
        op.update_cost(Decimal::ONE);

        assert_eq!(op.operating_cost, Decimal::from(50));
        assert_eq!(op.cost_per_unit, Decimal::from(50));
    }

    #[test]
    fn test_operation_cost_with_batch_size() {
        let mut op = BomOperationRow::new("Painting", Decimal::from(60), Decimal::from(200))
            .with_batch_size(Decimal::from(10));
        op.update_cost(Decimal::from(2));

        assert_eq!(op.operating_cost, Decimal::from(200));
        assert_eq!(op.base_operating_cost, Decimal::from(400));
        assert_eq!(op.cost_per_unit, Decimal::from(20));
        assert_eq!(op.base_cost_per_unit, Decimal::from(40));
    }

    #[test]
    fn test_zero_batch_size_defaults_to_one() {
        let mut op = BomOperationRow::new("Welding", Decimal::from(15), Decimal::from(80))
            .with_batch_size(Decimal::ZERO);
        op.update_cost(Decimal::ONE);

        assert_eq!(op.batch_size, Decimal::ONE);
        assert_eq!(op.cost_per_unit, Decimal::from(20));
    }
}
