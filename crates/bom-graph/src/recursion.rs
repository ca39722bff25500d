//! BOM 循環偵測
//!
//! 在 BOM 可被樹建構器使用之前必須通過此檢查。
//! 直接子 BOM 清單以可注入的快取保存；任何 BOM 的元件列變動時，
//! 宿主必須呼叫 invalidate 使該 BOM 的快取失效（惰性重建，後寫為準）。

use std::collections::HashMap;

use bom_core::{BomError, BomRepository, Result};

/// 直接子 BOM 快取介面
pub trait ChildrenCache {
    /// 讀取快取
    fn get(&self, bom_id: &str) -> Option<Vec<String>>;

    /// 寫入快取
    fn set(&mut self, bom_id: &str, children: Vec<String>);

    /// 使單一 BOM 的快取失效（元件列變動時呼叫）
    fn invalidate(&mut self, bom_id: &str);
}

/// 記憶體子 BOM 快取
#[derive(Debug, Default)]
pub struct InMemoryChildrenCache {
    map: HashMap<String, Vec<String>>,
}

impl InMemoryChildrenCache {
    /// 創建空的快取
    pub fn new() -> Self {
        Self::default()
    }

    /// 清除全部快取
    pub fn clear(&mut self) {
        self.map.clear();
    }
}

impl ChildrenCache for InMemoryChildrenCache {
    fn get(&self, bom_id: &str) -> Option<Vec<String>> {
        self.map.get(bom_id).cloned()
    }

    fn set(&mut self, bom_id: &str, children: Vec<String>) {
        self.map.insert(bom_id.to_string(), children);
    }

    fn invalidate(&mut self, bom_id: &str) {
        self.map.remove(bom_id);
    }
}

/// 循環偵測器
pub struct CycleDetector<'a> {
    repo: &'a dyn BomRepository,
}

impl<'a> CycleDetector<'a> {
    /// 創建新的偵測器
    pub fn new(repo: &'a dyn BomRepository) -> Self {
        Self { repo }
    }

    /// 檢查 BOM 是否存在循環引用
    ///
    /// 先一次性計算可達閉包，再對閉包做有界掃描，不逐邊重算。
    /// 違規條件：
    /// (a) bom_id 出現在閉包內任一元件列的 bom_no
    /// (b) bom_id 的產出物料以帶 bom_no 的元件列形式出現在閉包內
    ///     （同一物料在自身祖譜中以不同 BOM 身分被製造）
    /// (c) bom_id 出現在自身直接元件列的 bom_no
    pub fn check_recursion(&self, bom_id: &str, cache: &mut dyn ChildrenCache) -> Result<()> {
        let root = self.repo.get_bom(bom_id)?;
        let closure = self.transitive_closure(bom_id, cache)?;
        tracing::debug!("循環偵測: {} 可達 {} 張 BOM", bom_id, closure.len());

        for member in &closure {
            let bom = self.repo.get_bom(member)?;
            for row in &bom.components {
                let Some(child_bom_no) = row.bom_no.as_deref() else {
                    continue;
                };

                if child_bom_no == root.id {
                    return Err(BomError::Recursion {
                        root: root.id.clone(),
                        implicated: root.id.clone(),
                    });
                }

                // 同一物料可以葉節點形式重複出現，但不可再帶 BOM
                if row.product_code == root.product_code {
                    return Err(BomError::Recursion {
                        root: root.id.clone(),
                        implicated: child_bom_no.to_string(),
                    });
                }
            }
        }

        if root
            .components
            .iter()
            .any(|row| row.bom_no.as_deref() == Some(bom_id))
        {
            return Err(BomError::Recursion {
                root: root.id.clone(),
                implicated: root.id.clone(),
            });
        }

        Ok(())
    }

    /// 自 bom_id 出發、經元件列 bom_no 可達的全部 BOM 編號（含自身）
    pub fn transitive_closure(
        &self,
        bom_id: &str,
        cache: &mut dyn ChildrenCache,
    ) -> Result<Vec<String>> {
        let mut closure: Vec<String> = vec![bom_id.to_string()];
        let mut cursor = 0;

        while cursor < closure.len() {
            let current = closure[cursor].clone();
            let children = match cache.get(&current) {
                Some(children) => children,
                None => {
                    let children = self.repo.direct_child_bom_ids(&current)?;
                    cache.set(&current, children.clone());
                    children
                }
            };

            for child in children {
                if !closure.contains(&child) {
                    closure.push(child);
                }
            }
            cursor += 1;
        }

        Ok(closure)
    }
}
