//! Caption generation for outgoing posts.
//!
//! `CaptionSource` is the plug point for smarter generators; `TemplateCaptions`
//! is the built-in one and the fallback whenever another source fails.

use async_trait::async_trait;

use crate::constants::MAX_CAPTION_CHARS;
use crate::domain::content::{ContentKind, ContentSummary};
use crate::domain::social::PostingSettings;

const EXCERPT_CHARS: usize = 150;

#[derive(Debug, Clone, PartialEq)]
pub struct Caption {
    /// Final text sent to the platform
    pub caption: String,
    /// Caption body before the link and hashtags were appended
    pub raw_caption: Option<String>,
    pub hashtags: Vec<String>,
    /// Whether a generator (rather than the author) wrote the text
    pub generated: bool,
}

impl Caption {
    /// Author-supplied caption, used as-is
    pub fn custom(text: &str) -> Self {
        Self {
            caption: text.to_string(),
            raw_caption: Some(text.to_string()),
            hashtags: Vec::new(),
            generated: false,
        }
    }
}

pub struct CaptionRequest<'a> {
    pub kind: ContentKind,
    pub content: &'a ContentSummary,
    pub target_url: &'a str,
    pub settings: &'a PostingSettings,
}

#[async_trait]
pub trait CaptionSource: Send + Sync {
    async fn generate(&self, request: &CaptionRequest<'_>) -> anyhow::Result<Caption>;
}

/// Title, excerpt, link and hashtags
#[derive(Debug, Clone, Default)]
pub struct TemplateCaptions {
    /// Always placed first in the hashtag list when set
    pub brand_tag: Option<String>,
}

impl TemplateCaptions {
    pub fn new(brand_tag: Option<String>) -> Self {
        Self { brand_tag }
    }

    pub fn render(&self, request: &CaptionRequest<'_>) -> Caption {
        let content = request.content;
        let hashtags = self.hashtags(
            content.category.as_deref(),
            request.kind,
            request.settings.hashtag_limit(),
        );

        let mut caption = content.title.clone();
        let mut raw_caption = content.title.clone();
        if let Some(excerpt) = content.excerpt.as_deref().filter(|e| !e.trim().is_empty()) {
            caption.push_str("\n\n");
            caption.push_str(&shorten(excerpt, EXCERPT_CHARS));
            raw_caption.push_str("\n\n");
            raw_caption.push_str(excerpt);
        }
        caption.push_str("\n\nRead more: ");
        caption.push_str(request.target_url);
        if !hashtags.is_empty() {
            caption.push_str("\n\n");
            caption.push_str(&hashtags.join(" "));
        }

        Caption {
            caption: fit_caption(&caption),
            raw_caption: Some(raw_caption),
            hashtags,
            generated: true,
        }
    }

    /// Category tags, then per-kind tags, brand tag first, capped at `limit`
    pub fn hashtags(&self, category: Option<&str>, kind: ContentKind, limit: usize) -> Vec<String> {
        let mut tags: Vec<String> = category
            .and_then(category_tags)
            .unwrap_or(&["#Insights", "#DiscoverMore"])
            .iter()
            .map(|t| t.to_string())
            .collect();

        let kind_tags: &[&str] = match kind {
            ContentKind::Product => &["#ProductReview", "#Recommendations"],
            ContentKind::Blog => &["#BlogPost", "#ReadMore"],
            ContentKind::LandingPage => &["#CampaignAlert", "#LimitedOffer"],
        };
        tags.extend(kind_tags.iter().map(|t| t.to_string()));

        if let Some(brand) = &self.brand_tag {
            tags.retain(|t| t != brand);
            tags.insert(0, brand.clone());
        }

        tags.truncate(limit);
        tags
    }
}

#[async_trait]
impl CaptionSource for TemplateCaptions {
    async fn generate(&self, request: &CaptionRequest<'_>) -> anyhow::Result<Caption> {
        Ok(self.render(request))
    }
}

fn category_tags(category: &str) -> Option<&'static [&'static str]> {
    let tags: &'static [&'static str] = match category {
        "Tech" => &[
            "#Technology",
            "#Innovation",
            "#TechGadgets",
            "#TechReview",
            "#DigitalTransformation",
        ],
        "Health" => &[
            "#Health",
            "#Wellness",
            "#HealthTech",
            "#HealthyLiving",
            "#WellnessJourney",
        ],
        "Finance" => &[
            "#Finance",
            "#FinTech",
            "#PersonalFinance",
            "#FinancialFreedom",
            "#MoneyMatters",
        ],
        "Travel" => &[
            "#Travel",
            "#TravelTips",
            "#Wanderlust",
            "#TravelGuide",
            "#ExploreTheWorld",
        ],
        "Fashion" => &[
            "#Fashion",
            "#Style",
            "#FashionTrends",
            "#FashionInspo",
            "#StyleGuide",
        ],
        "Food" => &[
            "#Food",
            "#Foodie",
            "#FoodReview",
            "#Cooking",
            "#FoodLovers",
        ],
        "Fitness" => &[
            "#Fitness",
            "#Workout",
            "#FitnessMotivation",
            "#HealthyLifestyle",
            "#FitnessJourney",
        ],
        "Beauty" => &[
            "#Beauty",
            "#Skincare",
            "#BeautyTips",
            "#SelfCare",
            "#BeautyProducts",
        ],
        "Home" => &[
            "#Home",
            "#HomeDecor",
            "#InteriorDesign",
            "#HomeImprovement",
            "#HomeInspiration",
        ],
        "Education" => &[
            "#Education",
            "#Learning",
            "#EdTech",
            "#OnlineLearning",
            "#SkillDevelopment",
        ],
        "Marketing" => &[
            "#Marketing",
            "#DigitalMarketing",
            "#ContentMarketing",
            "#MarketingStrategy",
            "#SocialMediaMarketing",
        ],
        "Business" => &[
            "#Business",
            "#Entrepreneurship",
            "#Leadership",
            "#BusinessGrowth",
            "#StartupLife",
        ],
        "Productivity" => &[
            "#Productivity",
            "#TimeManagement",
            "#WorkLifeBalance",
            "#ProductivityTips",
            "#Efficiency",
        ],
        "Career" => &[
            "#Career",
            "#CareerDevelopment",
            "#CareerAdvice",
            "#ProfessionalGrowth",
            "#JobSearch",
        ],
        "Technology" => &[
            "#Technology",
            "#Tech",
            "#Innovation",
            "#DigitalTransformation",
            "#FutureTech",
        ],
        "Lifestyle" => &[
            "#Lifestyle",
            "#SelfImprovement",
            "#PersonalDevelopment",
            "#LifeHacks",
            "#Inspiration",
        ],
        "Sustainability" => &[
            "#Sustainability",
            "#EcoFriendly",
            "#GreenLiving",
            "#ClimateAction",
            "#SustainableLiving",
        ],
        _ => return None,
    };
    Some(tags)
}

fn shorten(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut short: String = text.chars().take(max_chars).collect();
    short.push_str("...");
    short
}

/// Clamp to the platform's caption limit
pub fn fit_caption(caption: &str) -> String {
    caption.chars().take(MAX_CAPTION_CHARS).collect()
}
