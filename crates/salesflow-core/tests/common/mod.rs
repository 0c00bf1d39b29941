#![allow(dead_code)]

use std::path::Path;

use salesflow_core::config::PipelineConfig;

pub const STORES_CSV: &str = "\
Store,Type,Size
1,A,151315
2,B,202307
3,C,37392
";

pub const FEATURES_CSV: &str = "\
Store,Date,Temperature,Fuel_Price,MarkDown1,MarkDown2,MarkDown3,MarkDown4,MarkDown5,CPI,Unemployment,IsHoliday
1,2010-02-05,42.31,2.572,NA,NA,NA,NA,NA,211.0963582,8.106,FALSE
1,2010-02-12,38.51,2.548,NA,NA,NA,NA,NA,211.2421698,8.106,TRUE
2,2010-02-05,40.19,2.572,NA,NA,NA,NA,NA,210.7526053,8.324,FALSE
2,2010-02-12,38.49,2.548,NA,NA,NA,NA,NA,210.8979935,8.324,TRUE
3,2010-02-05,45.71,2.572,NA,NA,NA,NA,NA,214.4248812,7.368,FALSE
3,2010-02-12,47.93,2.548,NA,NA,NA,NA,NA,214.5747916,7.368,TRUE
1,2012-11-23,52.34,3.211,1200.5,-10.0,55000.0,300.0,-7.5,223.4,6.5,TRUE
2,2012-11-23,50.0,3.211,800.0,NA,120.0,NA,60.0,222.0,6.1,TRUE
3,2012-11-23,55.5,3.211,NA,3.0,NA,NA,NA,NA,NA,TRUE
";

/// Store 4 has no store record, so its row is dropped by the merge.
pub const TRAIN_CSV: &str = "\
Store,Dept,Date,Weekly_Sales,IsHoliday
1,1,2010-02-05,24924.5,FALSE
1,1,2010-02-12,46039.49,TRUE
1,5,2010-02-05,-50.0,FALSE
2,5,2010-02-12,250000.0,TRUE
3,1,2010-02-05,6453.58,FALSE
3,5,2010-02-12,4000.0,TRUE
4,1,2010-02-05,100.0,FALSE
";

/// Only store types A and C appear in the test extract.
pub const TEST_CSV: &str = "\
Store,Dept,Date,IsHoliday
1,5,2012-11-23,TRUE
3,5,2012-11-23,TRUE
1,1,2012-11-23,TRUE
";

pub fn write_external(data_dir: &Path) {
    let external = data_dir.join("external");
    std::fs::create_dir_all(&external).unwrap();
    std::fs::write(external.join("stores.csv"), STORES_CSV).unwrap();
    std::fs::write(external.join("features.csv"), FEATURES_CSV).unwrap();
    std::fs::write(external.join("train.csv"), TRAIN_CSV).unwrap();
    std::fs::write(external.join("test.csv"), TEST_CSV).unwrap();
}

/// Config rooted in `root` with the raw extracts in place and a local tracking dir.
pub fn fixture_config(root: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.paths.data_dir = root.join("data");
    config.tracking.local_dir = root.join("mlruns");
    write_external(&config.paths.data_dir);
    config
}
