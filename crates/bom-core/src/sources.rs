//! 資料來源介面
//!
//! 引擎透過這些窄介面讀取外部資料（BOM 庫、物料主檔、估價、價目表、
//! 倉庫庫存、單位換算），本身不做任何寫入；計算結果交由宿主系統持久化。

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::document::BomDocument;
use crate::Result;

/// BOM 庫讀取介面
pub trait BomRepository {
    /// 依編號取得 BOM（含元件/工序/報廢列）
    fn get_bom(&self, id: &str) -> Result<BomDocument>;

    /// 取得物料的預設 BOM
    fn find_default_bom(&self, product_code: &str) -> Option<BomDocument>;

    /// 直接子 BOM 編號（元件列帶 bom_no 者）
    fn direct_child_bom_ids(&self, id: &str) -> Result<Vec<String>>;

    /// 引用此 BOM 的父 BOM 編號（僅限啟用且已提交者，供成本回溯）
    fn parent_bom_ids(&self, id: &str) -> Result<Vec<String>>;
}

/// 物料主檔讀取介面
pub trait ProductSource {
    /// 物料是否存在
    fn exists(&self, product_code: &str) -> bool;

    /// 變體所屬的模板物料
    fn variant_of(&self, product_code: &str) -> Option<String>;

    /// 客供料（成本為零）
    fn is_customer_provided(&self, product_code: &str) -> bool;

    /// 委外加工物料
    fn is_subcontracted(&self, product_code: &str) -> bool;

    /// 物料主檔估價（估價法的最後一層備援）
    fn valuation_rate(&self, product_code: &str) -> Option<Decimal>;

    /// 物料主檔快取的最近採購價
    fn last_purchase_rate(&self, product_code: &str) -> Option<Decimal>;

    /// 採購單位
    fn purchase_uom(&self, product_code: &str) -> Option<String>;

    /// 最小訂購量
    fn min_order_qty(&self, product_code: &str) -> Decimal;

    /// 安全庫存
    fn safety_stock(&self, product_code: &str) -> Decimal;

    /// 預設倉庫
    fn default_warehouse(&self, product_code: &str) -> Option<String>;
}

/// 估價來源（庫存帳）
pub trait ValuationSource {
    /// 公司範圍內各倉庫的加權平均估價 = sum(stock_value) / sum(actual_qty)
    fn average_valuation_rate(&self, product_code: &str, company: &str) -> Option<Decimal>;

    /// 帳上最近一筆正估價
    fn last_positive_valuation_rate(&self, product_code: &str) -> Option<Decimal>;

    /// 最近採購紀錄的單價
    fn last_purchase_rate(&self, product_code: &str) -> Option<Decimal>;
}

/// 價目表來源
pub trait PriceListSource {
    /// 查詢價目表單價（依單位與數量級距）
    fn price_list_rate(
        &self,
        product_code: &str,
        price_list: &str,
        uom: &str,
        qty: Decimal,
    ) -> Option<Decimal>;
}

/// 倉儲格位明細
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BinDetails {
    /// 實際庫存量
    pub actual_qty: Decimal,
    /// 已下單未入庫量
    pub ordered_qty: Decimal,
    /// 保留量
    pub reserved_qty: Decimal,
    /// 預計可用量
    pub projected_qty: Decimal,
}

/// 倉庫庫存來源
pub trait StockSource {
    /// 預計可用量
    fn projected_qty(&self, product_code: &str, warehouse: &str) -> Decimal;

    /// 格位明細
    fn bin_details(&self, product_code: &str, warehouse: &str) -> BinDetails;
}

/// 單位換算來源
pub trait UomSource {
    /// 物料在指定單位下的換算係數（轉庫存單位）
    fn conversion_factor(&self, product_code: &str, uom: &str) -> Option<Decimal>;

    /// 單位是否限定整數
    fn is_whole_number(&self, uom: &str) -> bool;
}
