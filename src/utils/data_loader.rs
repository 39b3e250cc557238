use std::path::Path;

use crate::models::chart::ChartInfo;
use crate::utils::error::AppResult;

// 加载谱面定数 CSV (表头: song_id,difficulty,rating)
pub fn load_chart_info(path: &Path) -> AppResult<Vec<ChartInfo>> {
    log::debug!("正在加载谱面定数，路径: {}", path.display());
    let mut rdr = csv::Reader::from_path(path)?;
    let mut charts = Vec::new();

    for (index, result) in rdr.deserialize::<ChartInfo>().enumerate() {
        let line_num = index + 2; // +1 for header, +1 for 1-based index
        match result {
            Ok(record) if record.song_id.trim().is_empty() => {
                log::warn!("{} 第 {} 行缺少 song_id，已跳过", path.display(), line_num);
            }
            Ok(record) => {
                log::trace!("成功解析第 {} 行: {:?}", line_num, record);
                charts.push(record);
            }
            Err(e) => {
                log::error!("解析 {} 第 {} 行失败: {}", path.display(), line_num, e);
            }
        }
    }

    log::debug!("谱面定数加载完成，共 {} 条", charts.len());
    Ok(charts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chart::Difficulty;
    use std::fs;

    #[test]
    fn bad_rows_are_skipped() {
        let path = std::env::temp_dir().join(format!("chart_info_{}.csv", std::process::id()));
        fs::write(
            &path,
            "song_id,difficulty,rating\n\
             fractureray,2,11.2\n\
             fractureray,3,not-a-number\n\
             ,1,5.0\n\
             tempestissimo,9,11.3\n\
             tempestissimo,3,11.3\n",
        )
        .unwrap();

        let charts = load_chart_info(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(charts.len(), 2);
        assert_eq!(charts[0].song_id, "fractureray");
        assert_eq!(charts[0].difficulty, Difficulty::Future);
        assert_eq!(charts[1].difficulty, Difficulty::Beyond);
        assert_eq!(charts[1].rating, 11.3);
    }

    #[test]
    fn missing_file_is_an_error() {
        let path = std::env::temp_dir().join("definitely_missing_chart_info.csv");
        assert!(load_chart_info(&path).is_err());
    }
}
