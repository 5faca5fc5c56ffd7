use serde::Serialize;
use std::fmt;

/// Material-science topic a document can be tagged with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Steels, light alloys and other metallic materials
    Metals,
    /// Plastics, rubbers and resins
    Polymers,
    /// Ceramics and glasses
    Ceramics,
    /// Fibre-reinforced and layered composites
    Composites,
    /// Semiconductor and electronic materials
    Semiconductors,
    /// Mechanical and chemical property testing
    Properties,
    /// Forming, joining and heat treatment
    Processing,
}

impl Category {
    /// Every category, in tie-break order
    pub const ALL: [Category; 7] = [
        Category::Metals,
        Category::Polymers,
        Category::Ceramics,
        Category::Composites,
        Category::Semiconductors,
        Category::Properties,
        Category::Processing,
    ];

    /// Lower-case keywords that mark a document as belonging to the category
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            Category::Metals => &[
                "金属", "钢", "不锈钢", "铝", "铜", "钛", "镁", "合金", "铸铁",
                "metal", "steel", "aluminum", "aluminium", "copper", "titanium", "alloy",
            ],
            Category::Polymers => &[
                "高分子", "聚合物", "塑料", "橡胶", "树脂", "聚乙烯", "聚丙烯", "尼龙",
                "polymer", "plastic", "rubber", "resin", "polyethylene", "nylon",
            ],
            Category::Ceramics => &[
                "陶瓷", "玻璃", "氧化铝", "氧化锆", "碳化硅",
                "ceramic", "glass", "alumina", "zirconia", "silicon carbide",
            ],
            Category::Composites => &[
                "复合材料", "碳纤维", "玻璃纤维", "基体", "增强",
                "composite", "carbon fiber", "fiberglass", "laminate", "matrix",
            ],
            Category::Semiconductors => &[
                "半导体", "硅片", "晶圆", "芯片", "氮化镓",
                "semiconductor", "wafer", "silicon", "gallium nitride", "doping",
            ],
            Category::Properties => &[
                "强度", "硬度", "韧性", "腐蚀", "疲劳", "弹性模量", "密度",
                "strength", "hardness", "toughness", "corrosion", "fatigue", "modulus", "tensile",
            ],
            Category::Processing => &[
                "热处理", "焊接", "铸造", "锻造", "轧制", "淬火", "退火", "3d打印",
                "heat treatment", "welding", "casting", "forging", "annealing", "additive manufacturing",
            ],
        }
    }

    /// Snake-case name, matching the serialized form
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Metals => "metals",
            Category::Polymers => "polymers",
            Category::Ceramics => "ceramics",
            Category::Composites => "composites",
            Category::Semiconductors => "semiconductors",
            Category::Properties => "properties",
            Category::Processing => "processing",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A category found in a document and how many keyword hits backed it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryMatch {
    /// Matched category
    pub category: Category,
    /// Total keyword occurrences
    pub hits: usize,
}

/// Tags text with every category whose keywords occur in it
///
/// Ordered by hit count, highest first; ties keep [`Category::ALL`] order.
pub fn categorize(text: &str) -> Vec<CategoryMatch> {
    let haystack = text.to_lowercase();
    let mut matches: Vec<CategoryMatch> = Category::ALL
        .iter()
        .filter_map(|&category| {
            let hits: usize = category
                .keywords()
                .iter()
                .map(|keyword| haystack.matches(keyword).count())
                .sum();
            (hits > 0).then_some(CategoryMatch { category, hits })
        })
        .collect();

    // stable sort keeps declaration order on ties
    matches.sort_by(|a, b| b.hits.cmp(&a.hits));
    matches
}

/// Collapses whitespace and truncates to at most `max_chars` characters
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let mut cut: String = collapsed.chars().take(max_chars).collect();
    cut.push('…');
    cut
}
