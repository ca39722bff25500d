//! 腳踏車 BOM 成本與計劃完整範例
//!
//! 展示從 BOM 建立、循環檢查、成本回溯到生產計劃聚合的完整流程

use bom::{
    BomComponentRow, BomDocument, BomOperationRow, CostCalculator, CycleDetector, ExplosionEngine,
    InMemoryChildrenCache, InMemoryStore, MaterialPlanner, PlanOptions, ProductRecord,
    ProductionAggregator, ProductionPlanItem, TreeBuilder,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();

    println!("===== Bike BOM Costing Example =====\n");

    // 步驟 1: 建立物料主檔與庫存
    println!("[1] Create Products and Stock");
    let mut store = InMemoryStore::new();
    store.add_product(ProductRecord::new("BIKE"));
    store.add_product(ProductRecord::new("FRAME").with_default_warehouse("WH-SUB"));
    store.add_product(
        ProductRecord::new("STEEL-TUBE")
            .with_valuation_rate(Decimal::from(12))
            .with_purchase_uom("Box")
            .with_default_warehouse("WH-RM"),
    );
    store.add_product(
        ProductRecord::new("WHEEL")
            .with_valuation_rate(Decimal::from(25))
            .with_default_warehouse("WH-RM"),
    );
    store.add_uom("Box", true);
    store.add_uom_factor("STEEL-TUBE", "Box", Decimal::from(20));
    // 倉庫加權平均估價優先於主檔估價
    store.add_bin(
        "STEEL-TUBE",
        "WH-RM",
        "Default Company",
        Decimal::from(100),
        Decimal::from(1000),
        Decimal::from(40),
    );
    store.add_ledger_entry(
        "WHEEL",
        NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
        Decimal::from(24),
    );
    println!("    STEEL-TUBE: avg valuation 10.00 (bins)");
    println!("    WHEEL: ledger valuation 24.00\n");

    // 步驟 2: 建立兩層 BOM
    println!("[2] Create BOMs");
    let mut frame_bom = BomDocument::new("BOM-FRAME-001", "FRAME", Decimal::ONE)
        .with_component(BomComponentRow::new("STEEL-TUBE", Decimal::from(3)))
        .with_operation(BomOperationRow::new(
            "Welding",
            Decimal::from(30),
            Decimal::from(100),
        ));
    frame_bom.submit()?;
    store.add_bom(frame_bom)?;

    let mut bike_bom = BomDocument::new("BOM-BIKE-001", "BIKE", Decimal::ONE)
        .with_component(BomComponentRow::new("FRAME", Decimal::ONE).with_bom_no("BOM-FRAME-001"))
        .with_component(BomComponentRow::new("WHEEL", Decimal::from(2)))
        .with_rate_of_sub_assembly_from_bom(true)
        .with_default(true);
    bike_bom.submit()?;
    store.add_bom(bike_bom)?;
    println!("    BOM-FRAME-001: 3x STEEL-TUBE + Welding");
    println!("    BOM-BIKE-001: 1x FRAME (BOM) + 2x WHEEL\n");

    // 步驟 3: 循環檢查
    println!("[3] Check Recursion");
    let detector = CycleDetector::new(&store);
    let mut cache = InMemoryChildrenCache::new();
    detector.check_recursion("BOM-BIKE-001", &mut cache)?;
    println!("    OK: no cycles\n");

    // 步驟 4: 成本回溯（車架先算，整車以新單位成本計價）
    println!("[4] Cost Cascade");
    let updates = {
        let calc = CostCalculator::new(&store, &store, &store, &store);
        calc.update_cost_cascade("BOM-FRAME-001")?
    };
    for update in updates {
        println!(
            "    {}: {} -> {}",
            update.bom_id, update.previous_total_cost, update.new_total_cost
        );
        // 引擎不寫回，計算結果由宿主套用
        if let Some(stored) = store.bom_mut(&update.bom_id) {
            *stored = update.document;
        }
    }
    println!();

    // 步驟 5: BOM 樹與多層展開
    println!("[5] Tree and Explosion");
    let builder = TreeBuilder::new(&store, &store);
    let tree = builder.build("BOM-BIKE-001")?;
    for node in tree.level_order_traversal() {
        println!(
            "    {} x{} (exploded {})",
            node.product_code, node.qty, node.exploded_qty
        );
    }
    let engine = ExplosionEngine::new(&store);
    for (code, row) in engine.explode("BOM-BIKE-001")? {
        println!("    exploded: {} x{} @ {}", code, row.stock_qty, row.rate);
    }
    println!();

    // 步驟 6: 生產計劃聚合（50 台腳踏車）
    println!("[6] Production Plan: 50 bikes");
    let items = vec![ProductionPlanItem::new("BIKE", Decimal::from(50))];
    let options = PlanOptions::new().with_skip_available_stock(true);

    let aggregator = ProductionAggregator::new(&store, &store, &store);
    for req in aggregator.sub_assembly_requirements(&items, &options)? {
        println!(
            "    sub-assembly L{}: {} x{} ({:?})",
            req.bom_level, req.production_product, req.required_qty, req.manufacturing_mode
        );
    }

    let planner = MaterialPlanner::new(&store, &store, &store, &store);
    for req in planner.material_requirements(&items, &options)? {
        println!(
            "    material: {} x{} {} (projected {})",
            req.product_code, req.quantity, req.uom, req.projected_qty
        );
    }

    println!("\n===== Done =====");
    Ok(())
}
