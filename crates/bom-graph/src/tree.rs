//! BOM 樹的具體化與層序走訪

use std::collections::VecDeque;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bom_core::{BomError, BomRepository, ProductSource, Result};

/// BOM 樹節點（暫態結構，每次查詢重建，不持久化）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BomTree {
    /// 節點名稱：BOM 節點為 BOM 編號，葉節點為物料代碼
    pub name: String,

    /// 是否為 BOM 節點（否則為葉物料）
    pub is_bom: bool,

    /// 物料代碼
    pub product_code: String,

    /// 生產一單位直接父項所需數量
    pub qty: Decimal,

    /// 生產樹根所需的累計數量
    pub exploded_qty: Decimal,

    /// BOM 每批產出數量（葉節點為 1）
    pub bom_qty: Decimal,

    /// 子節點
    pub child_products: Vec<BomTree>,
}

impl BomTree {
    /// 層序走訪（不含根節點）
    ///
    /// 例如下列樹的走訪結果為 [SubAssy1, product1, product2, SubAssy2, product3, product4]：
    ///
    /// ```text
    /// BOM:
    ///     - SubAssy1
    ///         - product1
    ///         - product2
    ///     - SubAssy2
    ///         - product3
    ///     - product4
    /// ```
    ///
    /// 生產聚合依賴此順序：外層子裝配先於內層
    pub fn level_order_traversal(&self) -> Vec<&BomTree> {
        let mut traversal = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(self);

        while let Some(node) = queue.pop_front() {
            for child in &node.child_products {
                traversal.push(child);
                queue.push_back(child);
            }
        }

        traversal
    }

    /// 走訪所有葉節點，累加各物料佔樹根的累計數量
    pub fn leaf_quantities(&self) -> std::collections::BTreeMap<String, Decimal> {
        let mut totals = std::collections::BTreeMap::new();
        let mut queue = VecDeque::new();
        queue.push_back(self);

        while let Some(node) = queue.pop_front() {
            if node.child_products.is_empty() && !node.is_bom {
                *totals
                    .entry(node.product_code.clone())
                    .or_insert(Decimal::ZERO) += node.exploded_qty;
            }
            for child in &node.child_products {
                queue.push_back(child);
            }
        }

        totals
    }
}

/// BOM 樹建構器
///
/// 從 BOM 庫遞迴具體化整棵樹；建構前應先通過循環偵測
pub struct TreeBuilder<'a> {
    repo: &'a dyn BomRepository,
    products: &'a dyn ProductSource,
}

impl<'a> TreeBuilder<'a> {
    /// 創建新的建構器
    pub fn new(repo: &'a dyn BomRepository, products: &'a dyn ProductSource) -> Self {
        Self { repo, products }
    }

    /// 建構 BOM 樹（樹根累計數量為 1）
    pub fn build(&self, bom_id: &str) -> Result<BomTree> {
        self.build_with_multiplier(bom_id, Decimal::ONE)
    }

    /// 建構 BOM 樹，樹根累計數量為呼叫端指定的倍數
    pub fn build_with_multiplier(&self, bom_id: &str, multiplier: Decimal) -> Result<BomTree> {
        tracing::debug!("建構 BOM 樹: {} (倍數 {})", bom_id, multiplier);
        self.build_node(bom_id, Decimal::ONE, multiplier)
    }

    fn build_node(&self, bom_id: &str, qty: Decimal, exploded_qty: Decimal) -> Result<BomTree> {
        let bom = self.repo.get_bom(bom_id)?;

        // 批量為 0 的 BOM 不可進入任何計算
        if bom.quantity <= Decimal::ZERO {
            return Err(BomError::Validation(format!(
                "BOM {} 的產出數量必須大於 0",
                bom.id
            )));
        }

        let mut node = BomTree {
            name: bom.id.clone(),
            is_bom: true,
            product_code: bom.product_code.clone(),
            qty,
            exploded_qty,
            bom_qty: bom.quantity,
            child_products: Vec::new(),
        };

        for row in &bom.components {
            let child_qty = row.stock_qty / bom.quantity;
            let child_exploded = exploded_qty * child_qty;

            match row.effective_bom_no() {
                Some(child_bom_id) => {
                    self.validate_reference(child_bom_id, &row.product_code)?;
                    let child = self.build_node(child_bom_id, child_qty, child_exploded)?;
                    node.child_products.push(child);
                }
                None => {
                    node.child_products.push(BomTree {
                        name: row.product_code.clone(),
                        is_bom: false,
                        product_code: row.product_code.clone(),
                        qty: child_qty,
                        exploded_qty: child_exploded,
                        bom_qty: Decimal::ONE,
                        child_products: Vec::new(),
                    });
                }
            }
        }

        Ok(node)
    }

    /// 一致性檢查：子 BOM 的產出物料必須等於元件物料
    /// （或等於元件所屬的模板物料，處理變體關係）
    fn validate_reference(&self, bom_no: &str, component: &str) -> Result<()> {
        let child_bom = self.repo.get_bom(bom_no)?;

        if child_bom.product_code == component {
            return Ok(());
        }

        if let Some(template) = self.products.variant_of(component) {
            if child_bom.product_code == template {
                return Ok(());
            }
        }

        Err(BomError::Resolution {
            bom_no: bom_no.to_string(),
            bom_product: child_bom.product_code,
            component: component.to_string(),
        })
    }
}
