//! Markdown rendering of an approved job description.

use crate::jd::schema::JobDescriptionArtifact;

pub fn render_jd_to_md(artifact: &JobDescriptionArtifact) -> String {
    let mut md = format!("# {}\n\n", artifact.job_title);

    if let Some(seniority) = &artifact.seniority {
        md.push_str(&format!("**Seniority:** {seniority}\n\n"));
    }
    md.push_str(&format!("{}\n\n", artifact.job_summary));

    push_list(&mut md, "Key Responsibilities", &artifact.key_responsibilities);
    push_list(&mut md, "Required Skills", &artifact.required_skills);
    push_list(
        &mut md,
        "Preferred Qualifications",
        &artifact.preferred_qualifications,
    );
    push_list(
        &mut md,
        "Tools & Technologies",
        &artifact.tools_and_technologies,
    );

    md.push_str(&format!(
        "## Work Environment\n\n{}\n\n",
        artifact.work_environment
    ));
    md.push_str(&format!(
        "## Reporting Structure\n\n{}\n\n",
        artifact.reporting_structure
    ));

    if let Some(leadership) = &artifact.leadership {
        md.push_str(&format!("## Leadership\n\n{leadership}\n\n"));
    }
    if let Some(achievements) = &artifact.achievements {
        md.push_str(&format!("## Achievements\n\n{achievements}\n\n"));
    }

    let projects = artifact.projects.as_deref().unwrap_or_default();
    if !projects.is_empty() {
        md.push_str("## Projects\n\n");
        for project in projects {
            md.push_str(&format!("### {}\n\n{}\n", project.title, project.description));
            if !project.technologies.is_empty() {
                md.push_str(&format!(
                    "\n*Technologies:* {}\n",
                    project.technologies.join(", ")
                ));
            }
            md.push('\n');
        }
    }

    md
}

fn push_list(md: &mut String, heading: &str, items: &[String]) {
    md.push_str(&format!("## {heading}\n\n"));
    for item in items {
        md.push_str(&format!("- {item}\n"));
    }
    md.push('\n');
}
