//! Student profile and the career-guidance prompt built from it.

use serde::{Deserialize, Serialize};

/// The profile a student submits. Validation (non-empty, length bounds) is
/// done by the web layer before it reaches the mediator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub age: u32,
    pub education: String,
    pub interest: String,
    pub hobby: String,
}

impl Profile {
    pub fn new(
        name: impl Into<String>,
        age: u32,
        education: impl Into<String>,
        interest: impl Into<String>,
        hobby: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            age,
            education: education.into(),
            interest: interest.into(),
            hobby: hobby.into(),
        }
    }
}

/// Cache-key input: the response depends on profile and goal only.
#[derive(Debug, Serialize)]
pub(crate) struct GuidanceRequest<'a> {
    pub profile: &'a Profile,
    pub goal: &'a str,
}

/// Render the counsellor prompt for one profile and goal.
pub fn career_prompt(profile: &Profile, goal: &str) -> String {
    let name = display_or(&profile.name, "Student");
    format!(
        r#"You are an expert student career counselor with 15+ years of experience.
Your task: Provide a **personalized, actionable career guide** for the student.

**Student Profile**:
- Name: {name}
- Age: {age}
- Education: {education}
- Interests: {interest}
- Hobbies: {hobby}
- Career Goal: "{goal}"

**Required Output Format** (Markdown):

# Personalized Career Guide for {name}

## Executive Summary
- **Best Fit Career**: [Primary recommendation]
- **Success Probability**: [High/Medium based on profile]
- **Timeline to Goal**: [Realistic timeframe]

## Top 3 Career Recommendations

### 1. [Career Path Name]
- **Why Perfect Fit**: [1-2 lines explaining alignment with interests/skills]
- **Role Description**: [2-3 lines about typical responsibilities]
- **Required Skills**: [Skill 1], [Skill 2], [Skill 3]
- **Learning Path**:
  1. [Immediate step - course/certification]
  2. [Medium-term goal - project/internship]
  3. [Long-term milestone - degree/experience]
- **Salary Range**: [Entry level - Experienced level]
- **Industry Demand**: [High/Growing/Stable with brief explanation]

### 2. [Alternative Career Path]
[Same format as above]

### 3. [Backup Option]
[Same format as above]

## Immediate Action Plan (Next 30 Days)
1. **Week 1**: [Specific action]
2. **Week 2**: [Specific action]
3. **Week 3**: [Specific action]
4. **Week 4**: [Specific action]

## Recommended Resources
- **Online Courses**: [2-3 specific recommendations]
- **Books**: [2 relevant books]
- **Communities**: [Professional groups/forums]
- **Mentorship**: [Where to find mentors]

## Potential Challenges & Solutions
- **Challenge 1**: [Issue] -> **Solution**: [How to overcome]
- **Challenge 2**: [Issue] -> **Solution**: [How to overcome]

**CRITICAL REQUIREMENTS**:
- Keep each section concise but actionable
- Use bullet points and numbered lists
- Include specific, searchable course/resource names
- Make recommendations age-appropriate
- Focus on practical, achievable steps
"#,
        name = name,
        age = profile.age,
        education = display_or(&profile.education, "Not specified"),
        interest = display_or(&profile.interest, "Not specified"),
        hobby = display_or(&profile.hobby, "Not specified"),
        goal = goal.trim(),
    )
}

fn display_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    let v = value.trim();
    if v.is_empty() {
        fallback
    } else {
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ana() -> Profile {
        Profile::new("Ana", 20, "BSc", "data", "chess")
    }

    #[test]
    fn prompt_embeds_profile_and_goal() {
        let p = career_prompt(&ana(), "become a data analyst");
        assert!(p.contains("- Name: Ana"));
        assert!(p.contains("- Age: 20"));
        assert!(p.contains("- Hobbies: chess"));
        assert!(p.contains("Career Goal: \"become a data analyst\""));
        assert!(p.contains("# Personalized Career Guide for Ana"));
    }

    #[test]
    fn blank_fields_get_placeholders() {
        let mut profile = ana();
        profile.name = "  ".into();
        profile.hobby = String::new();
        let p = career_prompt(&profile, "x");
        assert!(p.contains("- Name: Student"));
        assert!(p.contains("- Hobbies: Not specified"));
    }

    #[test]
    fn prompt_is_deterministic() {
        assert_eq!(career_prompt(&ana(), "goal"), career_prompt(&ana(), "goal"));
    }
}
